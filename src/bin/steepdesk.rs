#![forbid(unsafe_code)]

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use steepdesk::chat::Responder;
use steepdesk::engine::ReferralEngine;
use steepdesk::gateway::{ChatGateway, OpenAiAdapter};
use steepdesk::persist::SqlitePersistence;
use steepdesk::store::CodeStatus;

const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

#[derive(Parser)]
#[command(name = "steepdesk", version, about = "Tea business referral desk")]
struct Cli {
    /// SQLite database path (defaults to STEEPDESK_DB_PATH or ./steepdesk.sqlite)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new customer (optionally redeeming a referral code)
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        code: Option<String>,
    },
    /// Look up a customer by id, name, or phone
    Lookup { term: String },
    /// Validate a referral code without redeeming it
    Validate { code: String },
    /// Ask a single question about the business data
    Ask { message: String },
    /// Print overall business statistics
    Stats,
    /// Interactive chat over the business data
    Chat,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let db_path = cli.db.unwrap_or_else(SqlitePersistence::default_path);
    let persistence = match SqlitePersistence::new(&db_path) {
        Ok(p) => p,
        Err(err) => {
            eprintln!("[steepdesk] failed to open {}: {err}", db_path.display());
            std::process::exit(1);
        }
    };

    let mut engine = match ReferralEngine::new(Box::new(persistence)) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("[steepdesk] failed to load database: {err}");
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Register { name, phone, code } => {
            match engine.register_customer(&name, &phone, code.as_deref()) {
                Ok(reg) => {
                    println!("Customer registered successfully!");
                    println!("ID: {}", reg.customer_id);
                    println!("Referral codes: {}", reg.referral_codes.join(", "));
                    println!("Referred by: {}", reg.customer.referred_by);
                    if !reg.persisted {
                        eprintln!("[steepdesk] warning: database save failed; changes are in-memory only");
                    }
                }
                Err(err) => {
                    eprintln!("Registration failed: {err}");
                    std::process::exit(1);
                }
            }
        }

        Commands::Lookup { term } => match engine.get_customer_info(&term) {
            Ok(profile) => {
                let c = &profile.customer;
                println!("{} (ID: {})", c.name, c.customer_id);
                println!("Phone: {}", c.phone);
                println!("Registered: {}", c.registration_date);
                println!("Referred by: {}", c.referred_by);
                println!(
                    "Referrals: {}/3  Discount: {}",
                    c.referrals_completed,
                    if c.discount_earned { "Yes" } else { "No" }
                );
                println!("Codes:");
                for detail in &profile.codes {
                    println!("  {} [{}] {}", detail.code, detail.status.as_str(), detail.used_info);
                }
            }
            Err(err) => {
                eprintln!("{err}");
                std::process::exit(1);
            }
        },

        Commands::Validate { code } => {
            let check = engine.validate_referral_code(&code);
            println!("{}", check.message());
            if !check.is_valid() {
                std::process::exit(1);
            }
        }

        Commands::Ask { message } => {
            let mut responder = build_responder();
            let reply = responder.process_query(&engine, &message).await;
            println!("{}", reply.text);
        }

        Commands::Stats => {
            let usage = engine.code_usage();
            println!("Customers: {}", engine.customer_count());
            println!(
                "Referral codes: {} total, {} used, {} available",
                usage.total,
                usage.used,
                usage.available()
            );
            println!("Discount earners: {}", engine.discount_earners().len());
            let used: Vec<_> = engine
                .ledger()
                .rows()
                .iter()
                .filter(|r| r.status == CodeStatus::Used)
                .collect();
            for row in used {
                println!("  {} used by {} on {}", row.code, row.used_by_name, row.date_used);
            }
        }

        Commands::Chat => {
            let mut responder = build_responder();
            if responder.model_enabled() {
                eprintln!("[steepdesk] model-backed chat enabled");
            } else {
                eprintln!("[steepdesk] running in rule-based mode only (set OPENAI_API_KEY to enable the model)");
            }
            eprintln!("[steepdesk] ask about customers, referrals, or statistics; empty line exits");

            let stdin = io::stdin();
            loop {
                print!("> ");
                io::stdout().flush().ok();
                let mut line = String::new();
                match stdin.lock().read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        let query = line.trim();
                        if query.is_empty() {
                            break;
                        }
                        let reply = responder.process_query(&engine, query).await;
                        println!("{}\n", reply.text);
                    }
                    Err(err) => {
                        eprintln!("[steepdesk] read error: {err}");
                        break;
                    }
                }
            }
        }
    }
}

/// Model-backed responder when OPENAI_API_KEY is set, rule-based otherwise.
fn build_responder() -> Responder {
    match OpenAiAdapter::from_env() {
        Ok(adapter) => {
            let model =
                std::env::var("STEEPDESK_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
            let gateway: Arc<dyn ChatGateway> = Arc::new(adapter);
            Responder::new(Some(gateway), model)
        }
        Err(_) => Responder::rule_based(),
    }
}
