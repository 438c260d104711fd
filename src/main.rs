// SPDX-License-Identifier: MPL-2.0
use std::path::PathBuf;
use std::process::ExitCode;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use junebug::report::SubmitOutcome;
use junebug::{config, BugReporter, CapturedValue, DiagnosticHook};

struct Args {
    config: Option<PathBuf>,
    to: Option<String>,
    message: String,
    screenshot: Option<PathBuf>,
    screenshot_url: Option<String>,
    card: bool,
    dry_run: bool,
}

fn parse_args() -> Result<Args, pico_args::Error> {
    let mut args = pico_args::Arguments::from_env();
    Ok(Args {
        config: args.opt_value_from_str("--config")?,
        to: args.opt_value_from_str("--to")?,
        message: args
            .opt_value_from_str("--message")?
            .unwrap_or_else(|| "Something went wrong".to_string()),
        screenshot: args.opt_value_from_str("--screenshot")?,
        screenshot_url: args.opt_value_from_str("--screenshot-url")?,
        card: args.contains("--card"),
        dry_run: args.contains("--dry-run"),
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let hook = DiagnosticHook::install_global();

    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("junebug: {err}");
            eprintln!(
                "usage: junebug [--config <path>] [--to <inbox>] [--message <text>] \
                 [--screenshot <png>] [--screenshot-url <url>] [--card] [--dry-run]"
            );
            return ExitCode::from(2);
        }
    };

    match run(args, hook).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "junebug failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, hook: &DiagnosticHook) -> junebug::Result<ExitCode> {
    let mut settings = match &args.config {
        Some(path) => config::load_from_path(path)?,
        None => config::load()?,
    };
    if let Some(to) = args.to {
        settings.support_inbox = Some(to);
    }

    // Sample activity so the report has something to attach.
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "demo session started");
    tracing::warn!(latency_ms = 1840_u64, "slow response from profile service");
    hook.log(vec![
        "user settings".into(),
        CapturedValue::serialized(&settings),
    ]);
    hook.record_rejection("sync queue rejected: quota exceeded");

    let screenshot = match &args.screenshot {
        Some(path) => Some(STANDARD.encode(std::fs::read(path)?)),
        None => None,
    };

    let reporter = BugReporter::new(settings)?;

    if args.card {
        let card = reporter.chat_card(&args.message, args.screenshot_url.as_deref());
        println!("{}", card.to_pretty_json()?);
    }

    if args.dry_run {
        println!("{}", reporter.compose_email(&args.message, screenshot));
        return Ok(ExitCode::SUCCESS);
    }

    Ok(match reporter.submit(&args.message, screenshot).await {
        SubmitOutcome::Delivered => ExitCode::SUCCESS,
        SubmitOutcome::Skipped(reason) => {
            eprintln!("junebug: report not sent ({reason:?})");
            ExitCode::SUCCESS
        }
        SubmitOutcome::Failed(err) => {
            eprintln!("junebug: {err}");
            ExitCode::FAILURE
        }
    })
}
