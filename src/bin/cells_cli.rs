// ABOUTME: Operator CLI for account provisioning and master-key maintenance
// ABOUTME: Grounded on the teacher's admin-setup binary: clap subcommands over the Catalog/CryptoCore
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use cells_server::catalog::Catalog;
use cells_server::config::Settings;
use cells_server::crypto::CryptoCore;
use cells_server::logging;

#[derive(Parser)]
#[command(
    name = "cells-cli",
    about = "Operator tooling for the cells key-value service",
    long_about = "Provision admin users and maintain the master encryption key outside of the HTTP surface."
)]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a new user and immediately grant the admin flag.
    CreateAdminUser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Grant the admin flag to an already-registered user.
    PromoteUser {
        #[arg(long)]
        email: String,
    },
    /// Rotate the master encryption key. Destroys access to items encrypted
    /// under the previous key; only ever run this deliberately.
    RotateMasterKey {
        #[arg(long)]
        confirm: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init()?;
    let args = CliArgs::parse();
    let settings = Settings::from_env()?;

    match args.command {
        Command::CreateAdminUser { email, username, password } => {
            let catalog = Catalog::connect(&settings.database_url).await?;
            catalog.register_user(&email, &username, &password).await?;
            let user = catalog.promote_to_admin(&email).await?;
            info!(user_id = %user.id, %email, "created admin user");
            println!("created admin user {} ({})", user.username, user.id);
        }
        Command::PromoteUser { email } => {
            let catalog = Catalog::connect(&settings.database_url).await?;
            let user = catalog.promote_to_admin(&email).await?;
            info!(user_id = %user.id, %email, "promoted user to admin");
            println!("{email} is now an admin ({})", user.id);
        }
        Command::RotateMasterKey { confirm } => {
            if !confirm {
                anyhow::bail!(
                    "refusing to rotate without --confirm: this permanently \
                     destroys access to all items encrypted under the current key"
                );
            }
            let mut crypto = CryptoCore::load(&settings.master_key_path)?;
            crypto.rotate_master()?;
            info!(path = %settings.master_key_path.display(), "master key rotated");
            println!("master key rotated at {}", settings.master_key_path.display());
        }
    }

    Ok(())
}
