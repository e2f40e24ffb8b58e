use crate::logger;
use crate::GlobalOpts;
use anyhow::Context;
use clap::Subcommand;
use colored::*;

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Print all settings
    Show,
    /// Set a setting and save the settings file
    ///
    /// Keys: interpreter-path, extra-site-packages (a path list, separated
    /// like PATH), validation-timeout-ms.
    Set { key: String, value: String },
    /// Print the settings file path
    Path,
}

pub fn handle_config(action: Option<ConfigAction>, opts: &GlobalOpts) -> anyhow::Result<()> {
    match action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            let mut store = opts.settings_store()?;
            logger::debug(&format!("Reading settings from: {}", store.path().display()));
            let config = store.get();

            println!("{}", "Configuration:".bold().green());
            for (key, value) in config.values_iter() {
                let value = if value.is_empty() && opts.verbosity_level() > 0 {
                    "(empty)".yellow().to_string()
                } else {
                    value
                };
                println!("  {}: {}", key.cyan(), value);
            }
            if config.interpreter_path.is_empty() {
                println!(
                    "  {}: {}",
                    "effective-interpreter".cyan(),
                    config.effective_interpreter()
                );
            }
            Ok(())
        }
        ConfigAction::Set { key, value } => {
            let mut store = opts.settings_store()?;
            let mut edit = store.get().clone();
            edit.set(&key, &value)?;
            store.set(edit);
            store
                .save()
                .with_context(|| format!("Failed to save {}", store.path().display()))?;
            logger::success(&format!("Set {} = {}", key, value));

            if store.interpreter_changed_since_persist() {
                logger::warn(
                    "The worker interpreter changed; a running worker keeps the old one until it is restarted",
                );
            }
            Ok(())
        }
        ConfigAction::Path => {
            println!("{}", opts.settings_path()?.display());
            Ok(())
        }
    }
}
