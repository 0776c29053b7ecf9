//! Provision command: one full pass over the inventory.

use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use l2tpv6_core::{DeviceStatus, Provisioner, RunReport};

use crate::cli::{GlobalOpts, OutputFormat, ProvisionArgs};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

fn apply_overrides(cfg: &mut Config, args: &ProvisionArgs) {
    if let Some(n) = args.client_concurrency {
        cfg.provision.client_concurrency = n;
    }
    if args.create_missing_bridge {
        cfg.provision.create_missing_bridge = true;
    }
    if args.probe_gateway || args.mtu_sweep {
        cfg.provision.probe_gateway = true;
    }
    if args.mtu_sweep {
        cfg.provision.mtu_sweep = true;
    }
    if args.no_verify {
        cfg.provision.verify_after_apply = false;
    }
}

fn progress_bar(global: &GlobalOpts, devices: usize) -> ProgressBar {
    let interactive = matches!(global.output, OutputFormat::Table) && std::io::stderr().is_terminal();
    if global.quiet || !interactive {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(u64::try_from(devices).unwrap_or(u64::MAX));
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{pos}/{len}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn write_report(report: &RunReport, path: &Path) -> Result<(), CliError> {
    let body = if path.extension().is_some_and(|ext| ext == "json") {
        output::render_json(report, false)?
    } else {
        report.render_text()
    };
    std::fs::write(path, body)?;
    info!(path = %path.display(), "report written");
    Ok(())
}

fn render(report: &RunReport, global: &GlobalOpts) -> Result<String, CliError> {
    match global.output {
        OutputFormat::Table => Ok(output::paint_report(
            &report.render_text(),
            output::should_color(&global.color),
        )),
        OutputFormat::Json => output::render_json(report, false),
        OutputFormat::JsonCompact => output::render_json(report, true),
        OutputFormat::Yaml => output::render_yaml(report),
        OutputFormat::Plain => Ok(report
            .devices()
            .map(|d| format!("{}\t{}", d.host.label, d.status))
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

pub async fn handle(args: ProvisionArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut cfg = config::load(global)?;
    apply_overrides(&mut cfg, &args);
    cfg.validate()?;

    let inventory = config::load_inventory(global, &cfg)?;
    if let Some(base) = cfg.base_prefix()? {
        for warning in inventory.prefix_warnings(&base) {
            warn!("{warning}");
        }
    }

    let connector = config::connector(global, &cfg)?;
    let provisioner = Provisioner::new(connector, cfg.provision.clone());

    let progress = progress_bar(global, inventory.clients().len() + 1);
    let report = provisioner
        .run_observed(&inventory, |outcome| {
            progress.inc(1);
            progress.set_message(format!("{} {}", outcome.host.label, outcome.status));
        })
        .await;
    progress.finish_and_clear();

    if let Some(path) = &args.report {
        write_report(&report, path)?;
    }
    output::print_output(&render(&report, global)?, global.quiet);

    if report.has_failures() {
        let count = |status| report.devices().filter(|d| d.status == status).count();
        return Err(CliError::DevicesFailed {
            failed: count(DeviceStatus::Failed),
            partial: count(DeviceStatus::Partial),
            total: report.devices().count(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ProvisionArgs {
        ProvisionArgs {
            client_concurrency: None,
            report: None,
            create_missing_bridge: false,
            probe_gateway: false,
            mtu_sweep: false,
            no_verify: false,
        }
    }

    #[test]
    fn mtu_sweep_turns_on_connectivity_checks() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            &ProvisionArgs {
                mtu_sweep: true,
                ..args()
            },
        );
        assert!(cfg.provision.probe_gateway);
        assert!(cfg.provision.mtu_sweep);
    }

    #[test]
    fn absent_flags_keep_the_config() {
        let mut cfg = Config::default();
        cfg.provision.client_concurrency = 4;
        apply_overrides(&mut cfg, &args());
        assert_eq!(cfg, {
            let mut expected = Config::default();
            expected.provision.client_concurrency = 4;
            expected
        });
    }
}
