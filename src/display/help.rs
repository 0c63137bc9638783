//! Custom help formatting for consistent CLI display.

use crate::display::theme::Theme;
use console::style;

/// Format help text with consistent styling
pub fn format_help_section(title: &str, content: &str, indent: bool) -> String {
    let mut output = String::new();

    if Theme::should_disable_colors() {
        output.push_str(&format!("{title}\n"));
    } else {
        output.push_str(&format!("{}\n", style(title).cyan().bold()));
    }

    for line in content.lines() {
        if line.trim().is_empty() {
            output.push('\n');
        } else if indent && !line.starts_with("    ") {
            output.push_str(&format!("    {line}\n"));
        } else {
            output.push_str(&format!("{line}\n"));
        }
    }

    output
}

/// Help text shown after the command list
pub fn create_help_text() -> String {
    let mut help = String::new();

    let quick_start = r#"$ notevault init                 # Create .notevault/settings.toml
$ notevault embed-batch          # Embed every note in the workspace
$ notevault query "garden plans" # Nearest chunks to a question"#;

    help.push_str(&format_help_section("QUICK START", quick_start, true));
    help.push('\n');

    let examples = r#"# Re-embed one note after editing it
$ notevault embed notes/today.md

# Remove a note from the store
$ notevault delete notes/old.md

# Check the index against the chunk table, repair drift
$ notevault info
$ notevault update-index

# Machine-readable output
$ notevault query "recipes" -k 3 --json"#;

    help.push_str(&format_help_section("EXAMPLES", examples, true));
    help
}
