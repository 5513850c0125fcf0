pub mod anti_raid;
pub mod config;
pub mod logging;

use crate::{Data, Error};
use poise::serenity_prelude as serenity;

pub type EventHandler = for<'a> fn(
    &'a serenity::Context,
    &'a serenity::FullEvent,
    &'a Data,
) -> poise::BoxFuture<'a, Result<(), Error>>;

#[derive(Debug, Clone)]
pub struct ModuleDefinition {
    pub id: &'static str,
    pub name_key: &'static str,
    pub description_key: &'static str,
}

pub struct Module {
    pub definition: ModuleDefinition,
    pub commands: Vec<poise::Command<Data, Error>>,
    pub event_handlers: Vec<EventHandler>,
}

pub fn get_modules() -> Vec<Module> {
    vec![anti_raid::module(), logging::module(), config::module()]
}

pub fn commands() -> Vec<poise::Command<Data, Error>> {
    let mut all_commands = vec![];

    for mut module in get_modules() {
        let category = module.definition.id;
        for command in &mut module.commands {
            command.category = Some(category.into());
        }
        all_commands.extend(module.commands);
    }

    all_commands
}

pub fn definitions() -> Vec<ModuleDefinition> {
    get_modules().into_iter().map(|m| m.definition).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_ids_are_unique() {
        let mut ids: Vec<_> = definitions().into_iter().map(|d| d.id).collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }

    #[test]
    fn test_commands_are_categorized() {
        let commands = commands();
        let names: Vec<_> = commands.iter().map(|c| c.name.to_string()).collect();
        assert!(names.contains(&"antiraid".to_string()));
        assert!(names.contains(&"config".to_string()));
        assert!(commands.iter().all(|c| c.category.is_some()));
    }
}
