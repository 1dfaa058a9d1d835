use std::io::IsTerminal;

use clap::Parser;
use inquire::Confirm;

use wsldev::backend::wsl::WslManager;
use wsldev::cli::{Cli, Command, ImageCommand};
use wsldev::config::{self, Settings};
use wsldev::error::WslDevError;
use wsldev::host::{Arch, Host};
use wsldev::image::{self, HttpFetcher, ImageCache};
use wsldev::instance::{Context, Instances, storage_ids};
use wsldev::progress::{OutputMode, StepProgress};
use wsldev::provision::{self, CreateRequest};
use wsldev::remove::{self, STEPS_PER_INSTANCE};
use wsldev::{logging, paths, util};

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    let mode = resolve_output_mode(cli.verbose, cli.quiet);
    let file_log = logging::init(mode);

    let settings = config::load_config(cli.config.as_deref())?;

    // Activate file logging for commands that change instances
    if matches!(
        cli.command,
        Command::Create { .. } | Command::Remove { .. } | Command::RemoveAll { .. }
    ) {
        file_log
            .set_file(&paths::logs_dir().join("wsldev.log"))
            .ok();
    }

    let manager = WslManager::new(&settings.wsl_command);
    let instances = Instances {
        settings: &settings,
        manager: &manager,
    };

    match cli.command {
        Command::Create {
            release,
            version,
            force,
            no_update,
            root_only,
            ppa,
            no_shell,
        } => {
            let host = Host::detect()?;
            let mut progress = StepProgress::new(0, mode);
            let fetcher = HttpFetcher::new(mode.shows_bars().then(|| progress.multi().clone()));
            let ctx = Context {
                settings: &settings,
                host: &host,
                manager: &manager,
                fetcher: &fetcher,
            };

            let request = CreateRequest {
                force,
                no_update,
                root_only,
                additional_ppa: util::split_list(&ppa),
                shell: !no_shell,
                ..CreateRequest::new(
                    release.unwrap_or_else(|| settings.release.clone()),
                    version.unwrap_or(settings.version),
                )
            };
            provision::create(&ctx, &request, &mut rand_core::OsRng, &mut progress).await?;
        }
        Command::Remove { id } => {
            let mut progress = StepProgress::new(STEPS_PER_INSTANCE, mode);
            remove::remove(&instances, &id, &mut progress).await?;
        }
        Command::RemoveAll { yes } => {
            if !yes && std::io::stdin().is_terminal() {
                confirm_remove_all(&settings)?;
            }
            let mut progress = StepProgress::new(0, mode);
            let removed = remove::remove_all(&instances, &mut progress).await?;
            if removed > 0 {
                progress.println(&format!("Removed {removed} instance(s)."));
            }
        }
        Command::List { json } => {
            let listed = remove::list_instances(&instances).await?;
            if json {
                let out = facet_json::to_string(&listed).map_err(|e| WslDevError::Serialize {
                    what: "instance list".into(),
                    message: format!("{e:?}"),
                })?;
                println!("{out}");
            } else if listed.is_empty() {
                println!("No instances.");
            } else {
                println!("  {:<20} {:<12} DIRECTORY", "NAME", "REGISTERED");
                for instance in &listed {
                    let registered = if instance.registered { "yes" } else { "no" };
                    println!("  {:<20} {:<12} {}", instance.name, registered, instance.dir);
                }
            }
        }
        Command::Image { action } => run_image_command(&settings, action)?,
    }

    Ok(())
}

fn run_image_command(settings: &Settings, action: ImageCommand) -> Result<(), WslDevError> {
    let cache = ImageCache::new(&settings.cache_dir, &settings.image_url);
    match action {
        ImageCommand::List => image::print_cached(&cache),
        ImageCommand::Delete { release, arch } => {
            let arch = match arch {
                Some(raw) => Arch::parse(&raw)?,
                None => Arch::parse(&Host::detect()?.arch)?,
            };
            config::validate_release(&release)?;
            image::delete_cached(&cache, &release, arch)
        }
        ImageCommand::Clear => image::clear_cache(&cache),
    }
}

fn confirm_remove_all(settings: &Settings) -> Result<(), WslDevError> {
    let count = storage_ids(&settings.instance_root, &settings.prefix)?.len();
    if count == 0 {
        return Ok(());
    }
    let proceed = Confirm::new(&format!("Remove all {count} instance(s)?"))
        .with_default(false)
        .prompt()
        .map_err(map_inquire_err)?;
    if !proceed {
        return Err(WslDevError::Cancelled);
    }
    Ok(())
}

fn map_inquire_err(e: inquire::InquireError) -> WslDevError {
    match e {
        inquire::InquireError::OperationCanceled | inquire::InquireError::OperationInterrupted => {
            WslDevError::Cancelled
        }
        other => WslDevError::Validation {
            message: format!("prompt error: {other}"),
        },
    }
}

/// Spinners only when stdout is a terminal; `--quiet` wins over `--verbose`.
fn resolve_output_mode(verbose: bool, quiet: bool) -> OutputMode {
    if quiet {
        OutputMode::Quiet
    } else if verbose {
        OutputMode::Verbose
    } else if std::io::stdout().is_terminal() {
        OutputMode::Normal
    } else {
        OutputMode::Plain
    }
}
