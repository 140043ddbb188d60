//! `rostercache config` command handler.

use anyhow::Result;

use rostercache::config::Config;

use super::ConfigSubcommand;

pub(crate) fn cmd_config(action: ConfigSubcommand, config: &Config) -> Result<()> {
    match action {
        ConfigSubcommand::Show => println!("{}", render(config)?),
        ConfigSubcommand::Path => println!("{}", Config::path().display()),
    }
    Ok(())
}

/// Pretty JSON with the admin token masked.
fn render(config: &Config) -> Result<String> {
    let mut shown = config.clone();
    if shown.server.admin_token.is_some() {
        shown.server.admin_token = Some("********".to_string());
    }
    Ok(serde_json::to_string_pretty(&shown)?)
}
