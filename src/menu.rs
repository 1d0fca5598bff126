//! Interactive direction picker

use std::io::IsTerminal;

use anyhow::Result;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;
use tdconvert::Direction;

const EXIT: &str = "Exit";

/// Ask which direction to convert in
///
/// Returns `None` when the operator picks Exit or cancels. Without a terminal
/// there is nobody to ask and auto-detect is used.
pub fn choose_direction() -> Result<Option<Direction>> {
    if !std::io::stdin().is_terminal() || !std::io::stderr().is_terminal() {
        tracing::info!("No terminal attached, using auto-detect");
        return Ok(Some(Direction::Auto));
    }

    let mut items: Vec<String> = Direction::ALL.iter().map(|d| d.to_string()).collect();
    items.push(EXIT.to_string());

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Conversion direction")
        .items(&items)
        .default(0)
        .interact_opt()
        .map_err(|e| anyhow::anyhow!("Selection error: {}", e))?;

    Ok(selection.and_then(|idx| Direction::ALL.get(idx).copied()))
}
