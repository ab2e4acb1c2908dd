use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::sync::broadcast;

use classmate_client::{ApiError, ClassmateClient, ClientConfig, Notice, NoticeLevel};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("login failed: {0}")]
    LoginRejected(String),
    #[error("not logged in")]
    NoIdentity,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "classmate", about = "ClassMate API CLI")]
struct Cli {
    /// Overrides `CLASSMATE_API_URL` from the environment config.
    #[arg(long)]
    api_url: Option<String>,

    #[arg(long, env = "CLASSMATE_EMAIL")]
    email: String,

    #[arg(long, env = "CLASSMATE_PASSWORD", hide_env_values = true)]
    password: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the logged-in identity.
    Me,
    /// List the courses visible to the identity.
    Courses,
    Course {
        course_id: String,
    },
    Assignments {
        course_id: String,
    },
    Lectures {
        course_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(api_url) = cli.api_url {
        config.base_url = api_url.trim_end_matches('/').to_owned();
    }

    let client = ClassmateClient::new(config)?;
    let mut notices = client.store().subscribe_notices();
    if !client.store().log_in(&cli.email, &cli.password).await {
        return Err(CliError::LoginRejected(last_error(&mut notices)));
    }

    let output = run(&client, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(client: &ClassmateClient, command: Command) -> Result<Value, CliError> {
    let academic = client.academic();
    let value = match command {
        Command::Me => {
            let identity = client.session().identity().ok_or(CliError::NoIdentity)?;
            serde_json::to_value(identity)?
        }
        Command::Courses => Value::Array(academic.list_courses().await?),
        Command::Course { course_id } => academic.course(&course_id).await?,
        Command::Assignments { course_id } => Value::Array(academic.course_assignments(&course_id).await?),
        Command::Lectures { course_id } => Value::Array(academic.course_lectures(&course_id).await?),
    };
    Ok(value)
}

fn last_error(notices: &mut broadcast::Receiver<Notice>) -> String {
    let mut message = String::from("rejected");
    while let Ok(notice) = notices.try_recv() {
        if notice.level == NoticeLevel::Error {
            message = notice.message;
        }
    }
    message
}
