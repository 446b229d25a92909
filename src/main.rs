use std::path::PathBuf;

use speedy_filter::app::App;
use speedy_filter::config::Config;
use speedy_filter::error::{AppError, Result};

const USAGE: &str = "Usage:
  speedy-filter --apply <owner_id>
  speedy-filter --rules <owner_id>
  speedy-filter --import-rules <owner_id> <rules.toml>";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("{}", USAGE);
        return Ok(());
    }
    let owner_id = parse_owner(&args[2])?;

    // Load configuration
    let config = Config::load()?;
    let app = App::new(&config).await?;

    let result = run(&app, &args, owner_id).await;

    // Make sure match counts are written before exit, even after a failure
    app.shutdown().await;

    result
}

async fn run(app: &App, args: &[String], owner_id: i64) -> Result<()> {
    match args[1].as_str() {
        "--apply" => {
            let summary = app.classify_pending(owner_id).await?;
            println!(
                "Classified {} articles: {} matched, {} deleted, {} pushes queued, {} failed",
                summary.processed,
                summary.filtered,
                summary.deleted,
                summary.pushes_queued,
                summary.failed
            );
        }
        "--rules" => {
            for rule in app.active_rules(owner_id).await?.iter() {
                println!(
                    "{:>5} {:>4}  {} {} {:?} -> {}  ({} matches)",
                    rule.id,
                    rule.priority,
                    rule.field.as_str(),
                    rule.condition.as_str(),
                    rule.pattern,
                    rule.action,
                    rule.match_count
                );
            }
        }
        "--import-rules" if args.len() >= 4 => {
            let path = PathBuf::from(&args[3]);
            let document = std::fs::read_to_string(&path)?;
            let created = app.rules.import_rules(owner_id, &document).await?;
            println!("Imported {} rules from {:?}", created.len(), path);
        }
        _ => eprintln!("{}", USAGE),
    }

    Ok(())
}

fn parse_owner(arg: &str) -> Result<i64> {
    arg.parse()
        .map_err(|_| AppError::Config(format!("invalid owner id '{}'", arg)))
}
