// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! SootRing pump - drives a producer and a consumer thread through the ring
//! buffer and reports what moved.

use sootring::config::{AppConfig, ConfigManager};
use sootring::post::Poster;
use sootring::pump;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("sootring=debug".parse()?))
        .init();

    info!("Starting SootRing pump");

    let config = match ConfigManager::new().and_then(|manager| manager.load_config()) {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load config, using defaults: {}", e);
            AppConfig::default()
        }
    };

    let poster = Poster::from_config(&config.post, None);
    poster.verbose(
        1,
        format_args!(
            "ring capacity {}, {} bytes, max chunk {}",
            config.ring.capacity, config.pump.total_bytes, config.pump.max_chunk
        ),
    );

    match pump::run(&config.ring, &config.pump) {
        Ok(report) => {
            poster.post(format_args!(
                "moved {} bytes in {} writes / {} reads, {} wraps, {:.1} MiB/s",
                report.bytes,
                report.write_chunks,
                report.read_chunks,
                report.wraps,
                report.mib_per_sec()
            ));
            poster.verbose(
                1,
                format_args!(
                    "{} rejected writes, {} empty polls, checksum {:#018x}",
                    report.write_rejections, report.empty_polls, report.checksum
                ),
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            poster.object_error("pump", &e);
            Ok(ExitCode::FAILURE)
        }
    }
}
