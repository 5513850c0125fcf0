pub mod commands;
pub mod events;

use crate::modules::{Module, ModuleDefinition};

pub fn module() -> Module {
    Module {
        definition: ModuleDefinition {
            id: "anti_raid",
            name_key: "module-anti-raid-name",
            description_key: "module-anti-raid-desc",
        },
        commands: vec![commands::antiraid()],
        event_handlers: vec![events::handler],
    }
}
