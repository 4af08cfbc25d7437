use std::{env, env::VarError};

/// There's no real CLI for the server. Any argument prints the help text and the current settings.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 13] = [
        "RUST_LOG",
        "LEDGER_HOST",
        "LEDGER_PORT",
        "LEDGER_DATABASE_URL",
        "LEDGER_TREASURY_USER_ID",
        "LEDGER_COMMISSION_GENERAL",
        "LEDGER_COMMISSION_FOOD",
        "LEDGER_RELEASE_DELAY_HOURS",
        "LEDGER_HUB_TIMEOUT_HOURS",
        "LEDGER_BATCH_SIZE",
        "LEDGER_MIN_WITHDRAWAL",
        "LEDGER_SCHEDULER_INTERVAL_SECS",
        "LEDGER_STRIPE_API_BASE",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
