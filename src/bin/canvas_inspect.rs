use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use canvas_grading_queue::app::App;
use canvas_grading_queue::config;

#[derive(Parser, Debug)]
#[command(about = "List the Canvas courses a stored profile can see")]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// User whose stored credentials to use
    #[arg(long)]
    user: String,
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

    let courses = app.teacher_courses(&args.user).await?;
    println!("Courses for {}:", args.user);
    for course in courses {
        println!(
            "  {} -> {{ code: {}, name: {}, state: {} }}",
            course.id, course.code, course.name, course.workflow_state
        );
    }
    Ok(())
}
