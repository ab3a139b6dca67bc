use finance_brief_router::{
    agent::Orchestrator, build_registry, AppConfig, BriefStatus, Modality, Query,
};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: brief [--type <query_type>] [--voice] <question...>";

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Logs go to stderr so stdout stays clean JSON.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut declared_type = None;
    let mut modality = Modality::Text;
    let mut words = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--type" => declared_type = args.next(),
            "--voice" => modality = Modality::Voice,
            "-h" | "--help" => {
                eprintln!("{}", USAGE);
                return Ok(ExitCode::SUCCESS);
            }
            _ => words.push(arg),
        }
    }

    if words.is_empty() {
        eprintln!("{}", USAGE);
        return Ok(ExitCode::from(2));
    }

    let config = AppConfig::from_env()?;
    let registry = build_registry(&config)?;
    let orchestrator = Orchestrator::new(registry, config.router);

    let query = Query::new(words.join(" "), modality, declared_type);
    info!(query_id = %query.id, text = %query.text, "Running one-shot query");

    let response = orchestrator.handle(query).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(match response.status {
        BriefStatus::Error => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}
