use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use kyc_wizard::backend::HttpBackend;
use kyc_wizard::clock::SystemClock;
use kyc_wizard::config::WizardConfig;
use kyc_wizard::onboarding::{Acknowledgements, FieldValue, FileRef, WizardSession};
use kyc_wizard::store::LibSqlStore;

const HELP: &str = "\
Commands:
  email <address>         check for an earlier submission and send an OTP
  otp <code>              confirm the OTP
  resend                  send the OTP again (after the cooldown)
  set <field> <value>     edit a text field (camelCase name, e.g. companyName)
  attach <field> <file>   attach gstDocument, panDocument, photo or signature
  gst | pan               (re)run GST or PAN verification
  next | back             move between steps
  edit <step>             jump to step 0-4 from the confirmation screen
  status                  show the wizard state
  submit                  confirm both declarations and submit
  done                    acknowledge a successful submission
  reset                   discard all progress
  quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = WizardConfig::from_env()?;

    eprintln!("KYC Wizard v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Backend: {}", config.backend_url);
    eprintln!("   Database: {}", config.db_path);
    eprintln!("   Type 'help' for commands.\n");

    let store = LibSqlStore::new_local(std::path::Path::new(&config.db_path)).await?;
    let backend = HttpBackend::new(&config)?;
    let session = WizardSession::new(
        &config,
        Arc::new(backend),
        Arc::new(store),
        Arc::new(SystemClock),
    );

    match session.mount().await {
        Some(step) => eprintln!("Resuming at step {} ({})", step.index(), step.title()),
        None => eprintln!("Starting a new onboarding"),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprint!("> ");
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break, // EOF
            Err(e) => {
                tracing::error!("Error reading stdin: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            eprint!("> ");
            continue;
        }
        if matches!(line, "quit" | "exit") {
            break;
        }
        run_command(&session, line).await;
        eprint!("> ");
    }

    session.flush().await;
    Ok(())
}

async fn run_command(session: &WizardSession, line: &str) {
    let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    let verification = session.verification();

    match cmd {
        "help" => println!("{HELP}"),
        "email" => report(verification.request_otp(rest).await.map(|s| format!("{s:?}"))),
        "otp" => report(verification.verify_otp(rest).await.map(|s| format!("{s:?}"))),
        "resend" => report(verification.resend_otp().await.map(|s| format!("{s:?}"))),
        "set" => {
            let (field, value) = rest.split_once(' ').unwrap_or((rest, ""));
            match FieldValue::parse_text(field, value.trim()) {
                Some(value) => match session.set_field(value) {
                    Ok(update) => {
                        if let Some(check) = update.check {
                            let _ = check.await;
                            let status = session.status();
                            println!("PAN: {}  GST: {}", status.pan.label(), status.gst.label());
                        } else if !update.changed {
                            println!("(unchanged)");
                        }
                    }
                    Err(e) => println!("Error: {e}"),
                },
                None => println!("Unknown or non-text field: {field}"),
            }
        }
        "attach" => {
            let (field, name) = rest.split_once(' ').unwrap_or((rest, ""));
            let name = name.trim();
            if name.is_empty() {
                println!("Usage: attach <field> <file name>");
                return;
            }
            let file = Some(FileRef::new(name, "application/octet-stream", 0));
            let value = match field {
                "gstDocument" => FieldValue::GstDocument(file),
                "panDocument" => FieldValue::PanDocument(file),
                "photo" => FieldValue::Photo(file),
                "signature" => FieldValue::Signature(file),
                _ => {
                    println!("Unknown document field: {field}");
                    return;
                }
            };
            report(session.set_field(value).map(|_| "attached".to_string()));
        }
        "gst" => report(verification.verify_gst().await.map(|s| s.label().to_string())),
        "pan" => report(verification.verify_pan().await.map(|s| s.label().to_string())),
        "next" => report(session.next().map(|s| s.title().to_string())),
        "back" => report(session.back().map(|s| s.title().to_string())),
        "edit" => match rest.parse::<usize>() {
            Ok(index) => report(session.edit_section(index).map(|s| s.title().to_string())),
            Err(_) => println!("Usage: edit <0-4>"),
        },
        "status" => match serde_json::to_string_pretty(&session.status()) {
            Ok(json) => println!("{json}"),
            Err(e) => println!("Error: {e}"),
        },
        "submit" => report(
            session
                .submit(Acknowledgements::both())
                .await
                .map(|()| "Submitted. Type 'done' to start over.".to_string()),
        ),
        "done" => report(
            session
                .acknowledge_success()
                .await
                .map(|()| "Ready for a new onboarding".to_string()),
        ),
        "reset" => report(
            session
                .reset()
                .await
                .map(|()| "Progress discarded".to_string()),
        ),
        _ => println!("Unknown command: {cmd} (try 'help')"),
    }
}

fn report<E: std::fmt::Display>(result: Result<String, E>) {
    match result {
        Ok(msg) => println!("{msg}"),
        Err(e) => println!("Error: {e}"),
    }
}
