use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};

use outbreakwatch::alerts::{format_alert, AlertContext, DetectionResult};
use outbreakwatch::config::{Config, LoggingConfig};
use outbreakwatch::detect::{OutbreakAnalyzer, OutbreakVerdict};
use outbreakwatch::scheduler::{run_sweep, SweepContext, SweepSchedule};
use outbreakwatch::storage::reports::NewCaseReport;
use outbreakwatch::storage::subscribers::{add_subscriber, list_subscribers, set_active, NewSubscriber};
use outbreakwatch::storage::{self, SqliteReportStore};

#[derive(Parser)]
#[command(
    name = "outbreakwatch",
    about = "Disease outbreak detection and district alerting service",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the database path from the configuration
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + scheduled sweep)
    Serve {
        /// Bind address (defaults to server.bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Analyze one district/disease pair
    Check {
        #[arg(long)]
        district: String,

        #[arg(long)]
        disease: String,

        /// Evaluate as of this date (YYYY-MM-DD or RFC3339), default now
        #[arg(long)]
        as_of: Option<String>,

        /// Message language (en, hi)
        #[arg(long)]
        language: Option<String>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Run the district sweep once and dispatch alerts
    DailyCheck {
        #[arg(long)]
        json: bool,
    },

    /// Manage case reports
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },

    /// Manage alert subscribers
    Subscriber {
        #[command(subcommand)]
        action: SubscriberAction,
    },

    /// Fill the database with twelve weeks of demo reports
    SeedDemo {
        /// RNG seed, for reproducible data
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Render the alert message for a saved detection result (JSON file)
    Render {
        #[arg(long)]
        input: PathBuf,

        #[arg(long, default_value = "en")]
        language: String,
    },

    /// Preview when the sweep will run in the next N hours
    Schedule {
        #[arg(long, default_value = "48")]
        hours: u64,
    },
}

#[derive(Subcommand)]
enum ReportAction {
    /// Record a case report
    Add {
        #[arg(long)]
        state: String,

        #[arg(long)]
        district: String,

        #[arg(long)]
        disease: String,

        #[arg(long)]
        cases: u32,

        /// Report date (YYYY-MM-DD or RFC3339), default now
        #[arg(long)]
        date: Option<String>,

        #[arg(long)]
        source_url: Option<String>,
    },
}

#[derive(Subcommand)]
enum SubscriberAction {
    /// Register a subscriber for a district
    Add {
        #[arg(long)]
        name: String,

        #[arg(long)]
        phone: String,

        #[arg(long)]
        district: String,

        /// Do not deliver WhatsApp alerts to this subscriber
        #[arg(long)]
        no_whatsapp: bool,
    },

    /// List all subscribers
    List,

    /// Stop sending alerts to a subscriber
    Deactivate {
        #[arg(long)]
        id: i64,
    },

    /// Resume alerts for a subscriber
    Activate {
        #[arg(long)]
        id: i64,
    },
}

fn init_tracing(cfg: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if cfg.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn parse_when(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{}', expected YYYY-MM-DD or RFC3339", raw))?;
    // End of day, so reports filed that day fall inside the window.
    let end = day
        .and_hms_opt(23, 59, 59)
        .context("invalid time of day")?;
    Ok(end.and_utc())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::resolve(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.storage.db_path = db;
    }
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            tracing::info!(%bind, "Starting outbreakwatch daemon");
            outbreakwatch::serve(&config, &bind).await?;
        }
        Commands::Check {
            district,
            disease,
            as_of,
            language,
            json,
        } => {
            let as_of = as_of.as_deref().map(parse_when).transpose()?.unwrap_or_else(Utc::now);
            let language = language.unwrap_or_else(|| config.server.default_language.clone());
            let store = SqliteReportStore::new(storage::open_pool(&config.storage.db_path)?);
            let verdict = OutbreakAnalyzer::new(&store).analyze(&district, &disease, as_of)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&verdict)?);
                return Ok(());
            }

            println!("\n=== Outbreak Check: {} / {} ===", district, disease);
            match &verdict {
                OutbreakVerdict::Inconclusive => {
                    println!("Not enough data for analysis");
                    println!("Records on file: {}", store.count_for(&district, &disease)?);
                }
                OutbreakVerdict::Assessed(a) => {
                    let increase = a
                        .increase
                        .percent()
                        .map_or_else(|| "new cases over a zero baseline".to_string(), |p| format!("{}%", p));
                    println!("Alert level:     {}", a.alert_level);
                    println!("Outbreak:        {}", if a.is_outbreak { "YES" } else { "no" });
                    println!("Baseline avg:    {}", a.historical_avg);
                    println!("Current week:    {}", a.current_total);
                    println!("Increase:        {}", increase);
                    let ctx = AlertContext::from_assessment(&district, &disease, a);
                    println!("\n{}", format_alert(&ctx, &language));
                }
            }
            println!();
        }
        Commands::DailyCheck { json } => {
            let pool = storage::open_pool(&config.storage.db_path)?;
            let notifier = outbreakwatch::build_notifier(&config.notify)?;
            let ctx = SweepContext::from_config(pool, notifier, &config.sweep);
            let summary = run_sweep(&ctx, "manual", Utc::now()).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }

            println!("\nSweep {}", summary.run_id);
            println!(
                "Pairs checked: {} (inconclusive: {})",
                summary.pairs_checked, summary.inconclusive
            );
            if summary.outbreaks.is_empty() {
                println!("No outbreaks detected.");
            } else {
                println!("{:<20} | {:<16} | {:<8} | {:>6} | Notified", "District", "Disease", "Level", "Cases");
                println!("{:-<20}-|-{:-<16}-|-{:-<8}-|-{:->6}-|-{:-<8}", "", "", "", "", "");
                for o in &summary.outbreaks {
                    println!(
                        "{:<20} | {:<16} | {:<8} | {:>6} | {}/{}",
                        o.district,
                        o.disease,
                        o.alert_level.as_str(),
                        o.cases_this_week,
                        o.notified,
                        o.notified + o.failed
                    );
                }
            }
            for f in &summary.failures {
                println!(" ! {} / {}: {}", f.district, f.disease, f.error);
            }
            println!();
        }
        Commands::Report { action } => match action {
            ReportAction::Add {
                state,
                district,
                disease,
                cases,
                date,
                source_url,
            } => {
                let report_date = date.as_deref().map(parse_when).transpose()?.unwrap_or_else(Utc::now);
                let store = SqliteReportStore::new(storage::open_pool(&config.storage.db_path)?);
                let id = store.insert(&NewCaseReport {
                    state,
                    district: district.clone(),
                    disease: disease.clone(),
                    cases_count: cases,
                    report_date,
                    source_url,
                    alert_text: None,
                })?;
                println!("Report {} recorded: {} {} cases in {}.", id, cases, disease, district);
            }
        },
        Commands::Subscriber { action } => {
            let pool = storage::open_pool(&config.storage.db_path)?;
            match action {
                SubscriberAction::Add {
                    name,
                    phone,
                    district,
                    no_whatsapp,
                } => {
                    let id = add_subscriber(
                        &pool,
                        &NewSubscriber {
                            name: name.clone(),
                            phone,
                            district: district.clone(),
                            notify_whatsapp: !no_whatsapp,
                        },
                    )?;
                    println!("Subscriber '{}' ({}) added for {}.", name, id, district);
                }
                SubscriberAction::Deactivate { id } => {
                    if !set_active(&pool, id, false)? {
                        anyhow::bail!("no subscriber with id {}", id);
                    }
                    println!("Subscriber {} deactivated.", id);
                }
                SubscriberAction::Activate { id } => {
                    if !set_active(&pool, id, true)? {
                        anyhow::bail!("no subscriber with id {}", id);
                    }
                    println!("Subscriber {} activated.", id);
                }
                SubscriberAction::List => {
                    let list = list_subscribers(&pool)?;
                    if list.is_empty() {
                        println!("No subscribers found.");
                    } else {
                        println!("{:<5} | {:<20} | {:<15} | {:<15} | Active", "ID", "Name", "Phone", "District");
                        println!("{:-<5}-|-{:-<20}-|-{:-<15}-|-{:-<15}-|-{:-<6}", "", "", "", "", "");
                        for s in list {
                            println!(
                                "{:<5} | {:<20} | {:<15} | {:<15} | {}",
                                s.id, s.name, s.phone, s.district, s.is_active
                            );
                        }
                    }
                }
            }
        }
        Commands::SeedDemo { seed } => {
            let store = SqliteReportStore::new(storage::open_pool(&config.storage.db_path)?);
            let reports = outbreakwatch::seed::generate(&config.sweep.diseases, Utc::now(), seed);
            let n = outbreakwatch::seed::seed_store(&store, &reports)?;
            println!("Seeded {} demo reports.", n);
        }
        Commands::Render { input, language } => {
            let raw = std::fs::read_to_string(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let result: DetectionResult = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse {}", input.display()))?;
            println!("{}", format_alert(&result.context(), &language));
        }
        Commands::Schedule { hours } => {
            let schedule = SweepSchedule::parse(&config.sweep.cron)?;
            let runs = schedule.preview(Utc::now(), hours);
            if !config.sweep.enabled {
                println!("Scheduled sweep is disabled in the configuration.");
            }
            if runs.is_empty() {
                println!("No sweeps scheduled in next {} hours.", hours);
            } else {
                println!("Upcoming sweeps (next {} hours, cron '{}'):", hours, schedule.expr());
                for t in runs {
                    println!("{}", t.to_rfc3339());
                }
            }
        }
    }

    Ok(())
}
