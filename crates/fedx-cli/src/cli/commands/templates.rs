//! Templates command handler.

use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{ContentArrangement, Table};
use fedx_core::config::Config;
use fedx_core::core::state::FederationState;

/// Prints built-in and configured templates, configured ones winning on name.
pub fn list(config: &Config) {
    let state = FederationState::with_default_templates();
    for template in &config.templates {
        state.register_template(template.clone());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Name", "Description", "Tools"]);
    for template in state.templates() {
        let tools = if template.allowed_tools.is_empty() {
            "(none)".to_string()
        } else {
            template.allowed_tools.join(", ")
        };
        table.add_row(vec![template.name, template.description, tools]);
    }
    println!("{table}");
}
