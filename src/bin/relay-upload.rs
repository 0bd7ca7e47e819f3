//! Command-line client: sends one file to a running relay's `/upload` route.

use clap::Parser;
use reqwest::multipart::{Form, Part};
use std::path::PathBuf;
use std::process::ExitCode;

const PLACEHOLDER_CONTENTS: &str = "This is a placeholder file for your app's actual data.";

#[derive(Parser, Debug)]
#[command(name = "relay-upload", version, about = "Upload a file through a MEGA relay")]
struct Args {
    #[arg(
        short = 'u',
        long,
        env = "RELAY_SERVER_URL",
        default_value = "http://127.0.0.1:5000",
        help = "Base URL of the relay server"
    )]
    server_url: String,
    #[arg(
        short = 'k',
        long,
        env = "RELAY_API_KEY",
        hide_env_values = true,
        help = "Shared secret sent as X-API-KEY"
    )]
    api_key: Option<String>,
    #[arg(long, help = "Create the file with placeholder contents if it does not exist")]
    create_placeholder: bool,
    #[arg(help = "File to upload")]
    file: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<(), String> {
    if !args.file.exists() {
        if !args.create_placeholder {
            return Err(format!("file not found: {}", args.file.display()));
        }
        tokio::fs::write(&args.file, PLACEHOLDER_CONTENTS)
            .await
            .map_err(|err| format!("failed to create {}: {err}", args.file.display()))?;
        println!("Created placeholder file: {}", args.file.display());
    }

    let file_name = args
        .file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| format!("not a file: {}", args.file.display()))?;
    let contents = tokio::fs::read(&args.file)
        .await
        .map_err(|err| format!("failed to read {}: {err}", args.file.display()))?;

    let endpoint = format!("{}/upload", args.server_url.trim_end_matches('/'));
    println!("Uploading {file_name} to {endpoint}...");

    let form = Form::new().part("file", Part::bytes(contents).file_name(file_name));
    let mut request = reqwest::Client::new().post(&endpoint).multipart(form);
    if let Some(key) = &args.api_key {
        request = request.header("X-API-KEY", key);
    }

    let response = request
        .send()
        .await
        .map_err(|err| format!("upload failed (connection error): {err}"))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| format!("failed to read response: {err}"))?;

    if !status.is_success() {
        return Err(format!("upload failed ({status}): {body}"));
    }
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(value) => println!("Upload successful: {value}"),
        Err(_) => println!("Upload successful: {body}"),
    }
    Ok(())
}
