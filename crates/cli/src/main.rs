use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use notifier_core::constants::API_DATE_FORMAT;
use notifier_core::delivery::{DeliveryChannel, LogDelivery, WebhookDelivery};
use notifier_core::intent::parse_body;
use notifier_core::locations::write_district_file;
use notifier_core::report::report_title;
use notifier_core::{
    AvailabilityClient, CommandInterpreter, CowinClient, FileSubscriberStore, FilterOutcome,
    FixedIntervalPacer, Intent, LocationIndex, NotificationScheduler, NotifierConfig,
    NotifierSettings, QueryResolver, ResultFilter, SubscriberStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "notifier")]
#[command(about = "Vaccine slot notifier CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how a chat message is interpreted
    Parse {
        /// The full message, including the trigger word
        message: Vec<String>,
    },
    /// Look up a district keyword in the index
    District {
        /// Keyword, matched as a substring of district names
        keyword: Vec<String>,
    },
    /// Query slots, using the same syntax as a chat query (without the trigger word)
    Slots {
        /// Query the 7-day calendar instead of a single date
        #[arg(long)]
        calendar: bool,
        /// Query date (DD-MM-YYYY); defaults to today plus any `<n>d` offset in the query
        #[arg(long)]
        date: Option<String>,
        /// e.g. `411001 411002 30` or `7d pune`
        query: Vec<String>,
    },
    /// Download every state's districts and write the index file
    FetchDistricts {
        /// Output path (defaults to NOTIFIER_DISTRICTS_FILE)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List saved subscribers
    Subscribers,
    /// Run one notification sweep now
    Sweep {
        /// Log reports instead of delivering them
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("notifier=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = NotifierSettings::from_env_values(|key| std::env::var(key).ok())?;
    let config = NotifierConfig::new(settings)?;

    match cli.command {
        Some(Commands::Parse { message }) => {
            let interpreter = CommandInterpreter::new(config.trigger());
            match interpreter.parse(&message.join(" ")) {
                Some(intent) => println!("{:#?}", intent),
                None => println!("Not addressed to {}", interpreter.trigger()),
            }
        }
        Some(Commands::District { keyword }) => {
            let index = LocationIndex::load(config.districts_file())?;
            let keyword = keyword.join(" ").to_lowercase();
            match index.lookup(&keyword) {
                Some((name, id)) => println!("{}: {}", name, id),
                None => println!("District Not Found: {}", keyword),
            }
        }
        Some(Commands::Slots {
            calendar,
            date,
            query,
        }) => {
            slots(&config, calendar, date.as_deref(), &query).await?;
        }
        Some(Commands::FetchDistricts { output }) => {
            let client = cowin_client(&config)?;
            let output = output.unwrap_or_else(|| config.districts_file().to_path_buf());
            let districts = client.fetch_all_districts().await?;
            let count = districts.len();
            write_district_file(&output, districts)?;
            println!("Wrote {} districts to {}", count, output.display());
        }
        Some(Commands::Subscribers) => {
            let store = FileSubscriberStore::open(config.subscribers_file())?;
            let subscribers = store.list_all().await?;
            if subscribers.is_empty() {
                println!("No subscribers found.");
            } else {
                for s in subscribers {
                    println!(
                        "User: {}, Location: {}, Age: {}",
                        s.user_id,
                        s.preference.label(),
                        s.age_tier
                    );
                }
            }
        }
        Some(Commands::Sweep { dry_run }) => {
            let index = Arc::new(LocationIndex::load(config.districts_file())?);
            let store = Arc::new(FileSubscriberStore::open(config.subscribers_file())?);
            let channel: Arc<dyn DeliveryChannel> = match config.webhook_url() {
                Some(url) if !dry_run => {
                    Arc::new(WebhookDelivery::new(url, config.request_timeout())?)
                }
                _ => Arc::new(LogDelivery),
            };
            let scheduler = NotificationScheduler::new(
                &config,
                index,
                Arc::new(cowin_client(&config)?),
                store,
                channel,
                Arc::new(FixedIntervalPacer::new(config.delivery_pacing())),
            );
            let summary = scheduler
                .run_sweep(chrono::Local::now().date_naive())
                .await?;
            println!(
                "Subscribers: {}, Queries: {}, Delivered: {}, Empty: {}, Failed: {}",
                summary.subscribers,
                summary.queries,
                summary.deliveries,
                summary.empty,
                summary.failures
            );
        }
        None => {
            println!("Use 'notifier --help' for commands");
        }
    }

    Ok(())
}

fn cowin_client(config: &NotifierConfig) -> Result<CowinClient, Box<dyn std::error::Error>> {
    Ok(CowinClient::new(
        config.api_base_url(),
        config.api_token().map(str::to_owned),
        config.request_timeout(),
    )?)
}

async fn slots(
    config: &NotifierConfig,
    calendar: bool,
    date: Option<&str>,
    query: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let tokens: Vec<&str> = query.iter().map(String::as_str).collect();
    let Intent::Query(query) = parse_body(&tokens) else {
        return Err("expected a slot query, not a subcommand".into());
    };

    let date = match date {
        Some(value) => NaiveDate::parse_from_str(value, API_DATE_FORMAT)?,
        None => chrono::Local::now().date_naive()
            + chrono::Days::new(u64::from(query.date_offset_days)),
    };

    let index = Arc::new(LocationIndex::load(config.districts_file())?);
    let resolved = QueryResolver::new(index).resolve(&query.location, None)?;
    for candidate in &resolved.rejected {
        println!("Invalid Pincode {}", candidate);
    }

    let client = cowin_client(config)?;
    let filter = ResultFilter::new(config.age_policy(), config.report_cap());
    let tier = query.age_tier.unwrap_or_default();

    for (target, label) in resolved.target.query_targets() {
        let records = if calendar {
            client.query_calendar(&target, date).await?
        } else {
            client.query(&target, date).await?
        };
        match filter.filter(&records, tier, report_title(&label, date)) {
            FilterOutcome::NoRecords => println!(
                "No Vaccination Available at {} on {}",
                label,
                date.format(API_DATE_FORMAT)
            ),
            FilterOutcome::NoneForAgeGroup => println!(
                "No Vaccination Available at {} on {} for age group {}",
                label,
                date.format(API_DATE_FORMAT),
                tier
            ),
            FilterOutcome::Report(report) => println!("{}\n", report.render_text()),
        }
    }

    Ok(())
}
