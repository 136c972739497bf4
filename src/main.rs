//! boxprobe command line entry point.
use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use boxprobe::command;
use boxprobe::generator::IdGenerator;
use boxprobe::input::{Config, Opts};
use boxprobe::proxy;
use boxprobe::scanner::prober::HttpProber;
use boxprobe::scanner::retry::RetryPolicy;
use boxprobe::scanner::{HitOutput, ScanContext, Scanner};
use boxprobe::sinks::{HttpDownloader, SqliteStore, WebhookNotifier};
use boxprobe::telemetry::RateReporter;
use colored::Colorize;
use log::{debug, info};

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

#[cfg(not(tarpaulin_include))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut opts = Opts::read();
    let config = Config::read(opts.config_path.clone())?;
    opts.merge(&config)?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&opts.log_level))
        .init();
    debug!("Main() `opts` arguments are {opts:?}");

    opts.validate()?;

    if !opts.greppable && !opts.accessible {
        print_opening(&opts);
    }

    let prober = if opts.use_proxies {
        let path = opts.proxy_file.as_deref().context("--proxy-file is required")?;
        let endpoints = proxy::load_endpoints(path).await?;
        info!("Loaded {} proxies from {}", endpoints.len(), path.display());
        HttpProber::proxied(&opts.base_url, opts.timeout(), endpoints, &opts.proxy_scheme)?
    } else {
        HttpProber::direct(&opts.base_url, opts.timeout())?
    };

    let store = SqliteStore::connect(&opts.database)
        .await
        .with_context(|| format!("opening database {}", opts.database.display()))?;

    let mut context = ScanContext::new(
        &opts.base_url,
        opts.extensions.clone(),
        Arc::new(prober),
        Arc::new(store.clone()),
    )
    .with_retry(RetryPolicy::new(opts.retry_limit).with_delay(opts.retry_delay()))
    .with_output(HitOutput {
        greppable: opts.greppable,
        accessible: opts.accessible,
    });

    if opts.webhook_enabled {
        if let Some(url) = &opts.webhook_url {
            context = context.with_notifier(Arc::new(WebhookNotifier::new(url)?));
        }
    }
    if opts.download {
        let downloader = HttpDownloader::new(&opts.base_url, &opts.download_path).await?;
        info!("Downloading found files to {}", downloader.directory().display());
        context = context.with_downloader(Arc::new(downloader));
    }

    let scanner = Scanner::new(context, opts.workers, IdGenerator::with_length(opts.id_length));
    let control = scanner.control();

    let reporter = RateReporter::new(scanner.counters()).spawn(REPORT_INTERVAL, control.clone());
    tokio::spawn(command::listen(
        command::spawn_line_reader(io::BufReader::new(io::stdin())),
        control.clone(),
    ));
    tokio::spawn(command::stop_on_signal(control.clone()));

    info!("Scanning with {} workers. Type pause, resume or stop.", opts.workers);
    let summary = scanner.run().await;

    // A scan also ends when its source runs dry; make sure the helpers notice.
    control.stop();
    reporter.join().await;
    store.close().await;

    info!("{summary}");
    Ok(())
}

/// Prints the opening title.
#[cfg(not(tarpaulin_include))]
fn print_opening(opts: &Opts) {
    let title = r"
 _                              _
| |__   _____  ___ __  _ __ ___ | |__   ___
| '_ \ / _ \ \/ / '_ \| '__/ _ \| '_ \ / _ \
| |_) | (_) >  <| |_) | | | (_) | |_) |  __/
|_.__/ \___/_/\_\ .__/|_|  \___/|_.__/ \___|
                |_|";
    println!("{}", title.truecolor(0x9b, 0x59, 0xb6).bold());
    println!(
        "{} {}\n",
        "target:".bold(),
        format!("{}<id>{}", opts.base_url, opts.extensions.join("|")).cyan()
    );
}
