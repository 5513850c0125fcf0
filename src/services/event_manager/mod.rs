use crate::Data;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{error, info};

/// Fans gateway events out to the handlers registered by each module.
pub struct Handler {
    modules: Vec<crate::modules::Module>,
}

impl Handler {
    pub fn new() -> Self {
        Self {
            modules: crate::modules::get_modules(),
        }
    }

    fn handler_count(&self) -> usize {
        self.modules.iter().map(|m| m.event_handlers.len()).sum()
    }
}

#[serenity::async_trait]
impl serenity::EventHandler for Handler {
    async fn dispatch(&self, ctx: &serenity::Context, event: &serenity::FullEvent) {
        if let serenity::FullEvent::Ready { data_about_bot, .. } = event {
            info!(
                "Logged in as {}, {} module event handler(s) registered",
                data_about_bot.user.name,
                self.handler_count()
            );
        }

        // Member events for one guild are handled concurrently across modules.
        let event_arc = Arc::new(event.clone());
        let data = ctx.data::<Data>();

        for module in &self.modules {
            for handler in &module.event_handlers {
                let ctx = ctx.clone();
                let event_arc = event_arc.clone();
                let data = data.clone();
                let handler = *handler;
                let module_id = module.definition.id;

                tokio::spawn(async move {
                    if let Err(e) = handler(&ctx, &event_arc, &data).await {
                        error!("Error in event handler for module {}: {:?}", module_id, e);
                    }
                });
            }
        }
    }
}
