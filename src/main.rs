use billpay::application::bills::BillRepository;
use billpay::application::checkout::{Checkout, CheckoutEvent};
use billpay::application::poller::{PollOutcome, StatusPoller};
use billpay::application::token::TokenProvider;
use billpay::config::{CheckoutConfig, ItemConfig};
use billpay::domain::bill::BillStatus;
use billpay::domain::credential::ServiceIdentity;
use billpay::domain::ports::BankApiRef;
use billpay::infrastructure::http::HttpBank;
use billpay::infrastructure::in_memory::InMemoryBank;
use billpay::interfaces::console::EventPrinter;
use chrono::{Datelike, Local};
use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Pay a bill by bank QR code", long_about = None)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, default_value = "billpay.toml", global = true)]
    config: PathBuf,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Talk to an in-memory bank that settles on the second poll.
    #[arg(long, global = true)]
    sandbox: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config file and exit.
    Init,
    /// Create a bill, show its QR code and wait for payment.
    Pay(PayArgs),
    /// Query settlement once for a payer.
    Status {
        #[arg(long)]
        customer_id: String,
    },
    /// Mark a bill as cancelled remotely.
    Cancel {
        #[arg(long)]
        code: String,
    },
}

#[derive(Args)]
struct PayArgs {
    /// Bill a single item with this name instead of the configured items.
    #[arg(long, requires = "amount")]
    item: Option<String>,

    #[arg(long)]
    amount: Option<u64>,

    #[arg(long)]
    remark: Option<String>,

    /// Write the QR code to this PNG file.
    #[arg(long)]
    qr_out: Option<PathBuf>,

    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Wait without the expiry countdown.
    #[arg(long)]
    no_countdown: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::Init = cli.command {
        init_logging(cli.log_level.as_deref().unwrap_or("info"));
        CheckoutConfig::default().save(&cli.config).into_diagnostic()?;
        info!(path = %cli.config.display(), "wrote default config");
        println!("wrote {}", cli.config.display());
        return Ok(());
    }

    let mut config = CheckoutConfig::load(&cli.config).into_diagnostic()?;
    config.apply_env();
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    init_logging(&config.logging.level);

    let (api, identity) = connect(cli.sandbox, &config).await?;

    match cli.command {
        Command::Init => Ok(()),
        Command::Pay(args) => pay(api, identity, config, args).await,
        Command::Status { customer_id } => {
            let tokens = Arc::new(TokenProvider::new(api.clone(), identity));
            let poller = StatusPoller::new(
                api,
                tokens,
                config.flow.poll_interval(),
                config.flow.settled_code.clone(),
            );
            match poller.check(&customer_id).await.into_diagnostic()? {
                PollOutcome::Settled => println!("{}: settled", customer_id),
                PollOutcome::Pending => println!("{}: pending", customer_id),
            }
            Ok(())
        }
        Command::Cancel { code } => {
            let tokens = Arc::new(TokenProvider::new(api.clone(), identity));
            BillRepository::new(api, tokens)
                .update_status(&code, BillStatus::Cancelled)
                .await
                .into_diagnostic()?;
            println!("{}: cancelled", code);
            Ok(())
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn connect(sandbox: bool, config: &CheckoutConfig) -> Result<(BankApiRef, ServiceIdentity)> {
    if sandbox {
        info!("using the in-memory sandbox bank");
        let identity = config.api.identity().unwrap_or_else(|_| ServiceIdentity {
            username: "sandbox".to_string(),
            password: "sandbox".to_string(),
        });
        return Ok((Arc::new(InMemoryBank::sandbox().await), identity));
    }
    let identity = config.api.identity().into_diagnostic()?;
    let bank = HttpBank::new(config.api.clone()).into_diagnostic()?;
    Ok((Arc::new(bank), identity))
}

async fn pay(
    api: BankApiRef,
    identity: ServiceIdentity,
    mut config: CheckoutConfig,
    args: PayArgs,
) -> Result<()> {
    if let Some(ms) = args.poll_interval_ms {
        config.flow.poll_interval_ms = ms;
    }
    if args.no_countdown {
        config.flow.enable_countdown = false;
    }
    if let Some(name) = args.item {
        let today = Local::now();
        config.items = vec![ItemConfig {
            name,
            amount: args.amount.unwrap_or_default(),
            remark: args.remark.unwrap_or_default(),
            billing_month: today.month() as u8,
            billing_year: today.year() as u16,
        }];
    } else if let Some(first) = config.items.first_mut() {
        if let Some(amount) = args.amount {
            first.amount = amount;
        }
        if let Some(remark) = args.remark {
            first.remark = remark;
        }
    }

    let checkout = Checkout::new(api, identity, &config).into_diagnostic()?;
    let mut events = checkout.subscribe();
    let mut printer = EventPrinter::new(io::stdout());

    let started = checkout.start_payment_with_qr().await;
    while let Ok(event) = events.try_recv() {
        printer.print_event(&event).into_diagnostic()?;
    }
    started.into_diagnostic()?;

    let snapshot = checkout.snapshot();
    printer.print_summary(&snapshot).into_diagnostic()?;
    if let Some(qr) = &snapshot.qr {
        match &args.qr_out {
            Some(path) => {
                std::fs::write(path, qr.png_bytes().into_diagnostic()?).into_diagnostic()?;
                println!("QR code written to {}", path.display());
            }
            None => println!("{}", qr.data_uri()),
        }
    }

    let outcome = loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    printer.print_event(&event).into_diagnostic()?;
                    match event {
                        CheckoutEvent::Settled { .. } => break Ok(()),
                        CheckoutEvent::Expired { bill_code, .. } => {
                            break Err(miette!("payment {} expired", bill_code));
                        }
                        CheckoutEvent::AuthFailed { reason } => {
                            break Err(miette!("authentication failed: {}", reason));
                        }
                        _ => {}
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed checkout events"),
                Err(RecvError::Closed) => break Err(miette!("checkout stopped unexpectedly")),
            },
            signal = tokio::signal::ctrl_c() => {
                signal.into_diagnostic()?;
                info!("interrupted; cancelling payment");
                let cancelled = checkout.cancel_payment().await;
                while let Ok(event) = events.try_recv() {
                    printer.print_event(&event).into_diagnostic()?;
                }
                cancelled.into_diagnostic()?;
                break Err(miette!("payment cancelled"));
            }
        }
    };

    checkout.shutdown();
    outcome
}
