//! Command implementations.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing::{info, warn};

use devpanel_apscan::ScanEvent;
use devpanel_http::{FsFileSource, HttpTransport, file_ref_from_path};
use devpanel_ota::{OtaEvent, OtaHandle, ReadinessChange, UploadProgress};
use devpanel_protocol::{AccessPoint, ScanReport};

use crate::Command;
use crate::config::Config;

pub async fn run(command: Command, config: Config) -> anyhow::Result<()> {
    let transport = Arc::new(HttpTransport::new(config.request_timeout())?);

    match command {
        Command::Ota { file, url, wait } => {
            let ota = config.ota_config(url.as_deref());
            upload(ota, transport, &file, Duration::from_secs(wait)).await
        }
        Command::WatchOta { url } => watch(config.ota_config(url.as_deref()), transport).await,
        Command::Apscan { force, url } => {
            scan(config.scan_config(url.as_deref()), transport, force).await
        }
    }
}

async fn upload(
    ota: devpanel_ota::OtaConfig,
    transport: Arc<HttpTransport>,
    path: &Path,
    wait: Duration,
) -> anyhow::Result<()> {
    let file = file_ref_from_path(path).await?;
    let size = file.size;
    info!(file = %file.name, size, url = %ota.url, "preparing upload");

    let (handle, mut events, task) = devpanel_ota::spawn(ota, transport, Arc::new(FsFileSource));
    handle.select_file(Some(file)).await?;

    let admitted = match wait_until_ready(&mut events, wait).await {
        Ok(()) => handle.start_upload().await.map_err(anyhow::Error::from),
        Err(e) => Err(e),
    };
    if !matches!(admitted, Ok(true)) {
        handle.shutdown().await.ok();
        task.await.ok();
        admitted?;
        bail!("upload was not admitted");
    }

    let bar = ProgressBar::new(size);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .context("progress bar template")?
            .progress_chars("#>-"),
    );

    let outcome = follow_upload(&handle, &mut events, &bar, size).await;
    bar.finish_and_clear();
    handle.shutdown().await.ok();
    task.await.context("OTA task panicked")?;

    match outcome? {
        None => {
            println!("Upload finished, the device will restart.");
            Ok(())
        }
        Some(reason) => bail!("upload failed: {reason}"),
    }
}

async fn wait_until_ready(
    events: &mut mpsc::UnboundedReceiver<OtaEvent>,
    wait: Duration,
) -> anyhow::Result<()> {
    let deadline = tokio::time::sleep(wait);
    tokio::pin!(deadline);
    let mut last_reason = String::from("no response from device");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(OtaEvent::ReadinessChanged(ReadinessChange::Ready)) => return Ok(()),
                Some(OtaEvent::ReadinessChanged(ReadinessChange::NotReady { component, reason })) => {
                    info!(%component, %reason, "waiting");
                    last_reason = reason;
                }
                Some(_) => {}
                None => bail!("OTA manager stopped unexpectedly"),
            },
            _ = &mut deadline => bail!("device not ready after {}s: {last_reason}", wait.as_secs()),
            _ = tokio::signal::ctrl_c() => bail!("interrupted"),
        }
    }
}

/// Follows an admitted upload to its end. Returns the failure reason, if any.
async fn follow_upload(
    handle: &OtaHandle,
    events: &mut mpsc::UnboundedReceiver<OtaEvent>,
    bar: &ProgressBar,
    size: u64,
) -> anyhow::Result<Option<String>> {
    let mut aborted = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(OtaEvent::UploadProgress(progress)) => bar.set_position(position(progress, size)),
                Some(OtaEvent::UploadComplete { success: true, .. }) => return Ok(None),
                Some(OtaEvent::UploadComplete { reason, .. }) => {
                    return Ok(Some(reason.unwrap_or_else(|| "unknown error".into())));
                }
                Some(OtaEvent::ReadinessChanged(_)) => {}
                None => bail!("OTA manager stopped unexpectedly"),
            },
            _ = tokio::signal::ctrl_c(), if !aborted => {
                warn!("interrupted, aborting upload");
                aborted = true;
                handle.abort_upload().await?;
            }
        }
    }
}

fn position(progress: UploadProgress, size: u64) -> u64 {
    match progress {
        UploadProgress::Fraction(f) => (f * size as f64).round() as u64,
        UploadProgress::Bytes(sent) => sent.min(size),
    }
}

async fn watch(ota: devpanel_ota::OtaConfig, transport: Arc<HttpTransport>) -> anyhow::Result<()> {
    let (handle, mut events, task) = devpanel_ota::spawn(ota, transport, Arc::new(FsFileSource));

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(OtaEvent::ReadinessChanged(change)) => println!("{}", describe(&change)),
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown().await.ok();
    task.await.context("OTA task panicked")?;
    Ok(())
}

fn describe(change: &ReadinessChange) -> String {
    match change {
        ReadinessChange::Ready => "ready".to_string(),
        ReadinessChange::NotReady { component, reason } => format!("{component}: {reason}"),
    }
}

async fn scan(
    config: devpanel_apscan::ScanConfig,
    transport: Arc<HttpTransport>,
    force: bool,
) -> anyhow::Result<()> {
    let (handle, mut events, task) = devpanel_apscan::spawn(config, transport);
    if force {
        handle.refresh().await?;
    }

    let result = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ScanEvent::Updated { ok: true, message, report }) => break Ok((message, report)),
                Some(ScanEvent::Updated { message, .. }) => info!(%message, "scan pending"),
                None => break Err(anyhow::anyhow!("AP scan poller stopped unexpectedly")),
            },
            _ = tokio::signal::ctrl_c() => break Err(anyhow::anyhow!("interrupted")),
        }
    };

    handle.shutdown().await.ok();
    task.await.context("AP scan task panicked")?;

    let (raw, report) = result?;
    match report {
        Some(report) => print!("{}", format_report(&report)),
        None => {
            warn!("scan result is not in the expected format, printing raw body");
            println!("{raw}");
        }
    }
    Ok(())
}

fn format_report(report: &ScanReport) -> String {
    let mut aps: Vec<&AccessPoint> = report.aps.iter().collect();
    aps.sort_by(|a, b| b.rf.rssi().cmp(&a.rf.rssi()));

    let mut out = format!(
        "{:<32} {:<12} {:>3} {:>5} {:<4} {}\n",
        "SSID", "MAC", "CH", "RSSI", "PHY", "AUTH"
    );
    for ap in aps {
        out.push_str(&format!(
            "{:<32} {:<12} {:>3} {:>5} {:<4} {}\n",
            ap.ssid.as_deref().unwrap_or("<hidden>"),
            ap.mac,
            ap.rf.channel(),
            ap.rf.rssi(),
            ap.rf.phy(),
            ap.auth.join(","),
        ));
    }
    out
}
