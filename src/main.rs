use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use canvas_grading_queue::app::App;
use canvas_grading_queue::config;
use canvas_grading_queue::credentials::normalize_base_url;
use canvas_grading_queue::db;
use canvas_grading_queue::model::{QueueItem, RefreshStatus, SortOrder};
use canvas_grading_queue::refresh::RefreshResult;

#[derive(Debug, Parser)]
#[command(author, version, about = "Needs-grading queue across your Canvas courses")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Store Canvas credentials for a user
    Connect {
        #[arg(long)]
        user: String,
        /// Canvas instance URL, e.g. https://school.instructure.com
        #[arg(long)]
        base_url: String,
        /// Canvas personal access token
        #[arg(long)]
        token: String,
    },
    /// Remove stored Canvas credentials for a user
    Disconnect {
        #[arg(long)]
        user: String,
    },
    /// Print the grading queue for a user
    Queue {
        #[arg(long)]
        user: String,
        /// oldest | newest
        #[arg(long, default_value = "oldest")]
        order: SortOrder,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let app = App::from_config(&cfg).await?;

    match args.command {
        Command::Connect {
            user,
            base_url,
            token,
        } => {
            let Some(base_url) = normalize_base_url(&base_url) else {
                bail!("--base-url must be non-empty");
            };
            if token.trim().is_empty() {
                bail!("--token must be non-empty");
            }
            db::upsert_profile(&app.pool, &user, &base_url, token.trim()).await?;
            app.resolver.invalidate(&user).await;
            info!(user = %user, base_url = %base_url, "canvas credentials stored");
        }
        Command::Disconnect { user } => {
            if db::delete_profile(&app.pool, &user).await? {
                app.resolver.invalidate(&user).await;
                info!(user = %user, "canvas credentials removed");
            } else {
                warn!(user = %user, "no stored credentials");
            }
        }
        Command::Queue { user, order, json } => {
            let courses = app.teacher_courses(&user).await?;
            info!(courses = courses.len(), "refreshing grading queue");
            let snapshot = match app.refresher.refresh(&user, courses).await? {
                RefreshResult::Published(snapshot) => snapshot,
                RefreshResult::Superseded => bail!("refresh was superseded"),
            };
            let items = snapshot.sorted(order);

            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                print_table(&items);
                let summary = snapshot.report.summary();
                println!(
                    "\n{} items, {} submissions awaiting grading",
                    summary.total_items, summary.total_needs_grading
                );
            }

            match snapshot.report.status() {
                RefreshStatus::Complete => {}
                RefreshStatus::Partial { failed } => {
                    eprintln!("{} course(s) failed to refresh:", failed);
                    for (course_id, kind) in snapshot.report.failed_courses() {
                        eprintln!("  course {}: {}", course_id, kind.as_str());
                    }
                }
                RefreshStatus::AllFailed => eprintln!("No course could be refreshed; try again later."),
                RefreshStatus::ReconnectRequired => {
                    eprintln!("Canvas rejected the stored token; run `connect` again.")
                }
            }
        }
    }

    Ok(())
}

fn print_table(items: &[QueueItem]) {
    for item in items {
        let due = item
            .due_at
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "no due date".to_string());
        println!(
            "{:<16} {:<10} {:>4}  {:<12} {}",
            due,
            item.source_kind.as_str(),
            item.needs_grading_count,
            item.course_code,
            item.title
        );
    }
}
