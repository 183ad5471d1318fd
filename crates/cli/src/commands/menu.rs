use pizzabot_agent::responses::ReplyBook;
use pizzabot_agent::rules::KnowledgeBase;
use pizzabot_core::catalog::MenuCatalog;
use pizzabot_core::config::LoadOptions;

use crate::commands::{load_config, CommandResult};

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config("menu", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let catalog = match MenuCatalog::load(&config.data.menu_path) {
        Ok(catalog) => catalog,
        Err(error) => return CommandResult::failure("menu", "menu_load", error.to_string(), 4),
    };
    let knowledge_base = match KnowledgeBase::load(&config.data.knowledge_base_path) {
        Ok(knowledge_base) => knowledge_base,
        Err(error) => {
            return CommandResult::failure("menu", "knowledge_base_load", error.to_string(), 4)
        }
    };

    let replies = ReplyBook::new(config.restaurant.clone(), knowledge_base.templates());
    CommandResult::text(replies.format_menu(&catalog))
}
