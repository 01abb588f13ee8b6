use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

use ui_controller::{
    self as uic, Catalog, Controller, Priority, RegistryMetrics, SharedControllerRegistry,
};

#[derive(Parser, Debug)]
#[command(
    name = "uic",
    version,
    about = "Inspect UI automation controller selection",
    disable_help_subcommand = true
)]
struct Cli {
    /// Catalog file or directory of *.yaml catalogs
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Print registry metrics after the command
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List registered controllers, most preferred first
    List {
        /// Emit JSON instead of tab-separated text
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Show which controller would serve a device
    Select {
        #[arg(long, default_value = "")]
        device: String,
        /// Do not ask the provider on a miss
        #[arg(long, action = ArgAction::SetTrue)]
        no_install: bool,
    },
    /// Dump the UI tree through the selected controller
    Dump {
        #[arg(long, default_value = "")]
        device: String,
    },
    /// Run the provider for a device and list what it installed
    Install {
        #[arg(long)]
        device: String,
    },
    /// Remove a controller by name, then show the new selection
    Remove {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        device: String,
    },
    /// Register an extra always-workable controller, then show the new selection
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        device: String,
        #[arg(long, default_value = "medium")]
        priority: Priority,
    },
}

#[derive(Serialize)]
struct Selection<'a> {
    device: &'a str,
    controller: Option<String>,
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    let catalog = match &cli.catalog {
        Some(path) => uic::load_catalog(path)?,
        None => Catalog::default(),
    };
    let metrics = RegistryMetrics::new().map_err(anyhow::Error::msg)?;
    let registry: SharedControllerRegistry =
        catalog.build_registry().with_metrics(metrics.clone()).into();
    info!(
        controllers = registry.len()?,
        install_priority = %catalog.install_priority(),
        "registry ready"
    );

    match cli.command {
        Commands::List { json } => list(&registry, json)?,
        Commands::Select { device, no_install } => select(&registry, &device, !no_install)?,
        Commands::Dump { device } => dump(&registry, &device)?,
        Commands::Install { device } => {
            let count = registry.install_for_device(&device)?;
            println!("installed {count} controller(s) for '{device}'");
            list(&registry, false)?;
        }
        Commands::Remove { name, device } => {
            if !registry.remove_controller(&name)? {
                warn!(name = %name, "no controller with that name");
            }
            select(&registry, &device, false)?;
        }
        Commands::Add {
            name,
            device,
            priority,
        } => {
            let controller = uic::MockController::new(name, device.clone()).workable(true);
            registry.register_controller(Box::new(controller), priority)?;
            select(&registry, &device, false)?;
        }
    }

    if cli.metrics {
        print!("{}", metrics.encode_text());
    }
    Ok(())
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn controller_name(c: &dyn Controller) -> String {
    c.name().to_string()
}

fn list(registry: &SharedControllerRegistry, json: bool) -> Result<()> {
    let infos = registry.controllers()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }
    for info in infos {
        let device = if info.device.is_empty() {
            "*"
        } else {
            info.device.as_str()
        };
        println!(
            "{}\t{}\t{}\tworkable={}",
            info.name, device, info.priority, info.workable
        );
    }
    Ok(())
}

fn select(registry: &SharedControllerRegistry, device: &str, install: bool) -> Result<()> {
    let controller = if install {
        registry.get_or_install(device, controller_name)?
    } else {
        registry.with_controller(device, controller_name)?
    };
    let selection = Selection { device, controller };
    println!("{}", serde_json::to_string(&selection)?);
    Ok(())
}

fn dump(registry: &SharedControllerRegistry, device: &str) -> Result<()> {
    let dom = registry
        .get_or_install(device, |c| c.ui_dom())?
        .ok_or_else(|| anyhow::anyhow!("no workable controller for device '{device}'"))??;
    println!("{}", serde_json::to_string_pretty(&dom)?);
    Ok(())
}
