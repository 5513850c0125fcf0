pub mod membership;

use crate::{Data, Error};
use poise::serenity_prelude as serenity;

pub fn handler<'a>(
    ctx: &'a serenity::Context,
    event: &'a serenity::FullEvent,
    data: &'a Data,
) -> poise::BoxFuture<'a, Result<(), Error>> {
    Box::pin(async move {
        match event {
            serenity::FullEvent::GuildMemberAddition { new_member, .. } => {
                membership::handle_guild_member_add(ctx, new_member, data).await?;
            }
            serenity::FullEvent::GuildMemberRemoval {
                guild_id,
                user,
                member_data_if_available,
                ..
            } => {
                membership::handle_guild_member_remove(
                    ctx,
                    *guild_id,
                    user,
                    member_data_if_available.as_ref(),
                    data,
                )
                .await?;
            }
            _ => {}
        }
        Ok(())
    })
}
