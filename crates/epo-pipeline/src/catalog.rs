//! Product catalog client
//!
//! Fetches the JSON inventory of one product and resolves it into
//! download descriptors.

use std::path::Path;
use std::sync::LazyLock;

use epo_core::stream::{SHARED_RUNTIME, http_config};
use epo_core::http_client;
use regex::Regex;

use crate::error::PipelineError;
use crate::models::{DownloadDescriptor, Product};

/// Fetch and decode the product catalog.
///
/// Fails on any non-2xx status and on JSON that does not match the
/// catalog shape.
pub fn fetch_product(base_url: &str, product_id: u32) -> Result<Product, PipelineError> {
    let url = format!("{}/products/{}", base_url.trim_end_matches('/'), product_id);
    let timeout = http_config().request_timeout;

    SHARED_RUNTIME.handle().block_on(async {
        let response = http_client()
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| PipelineError::Catalog {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Catalog {
                url: url.clone(),
                message: format!("unexpected status {status}"),
            });
        }

        response
            .json::<Product>()
            .await
            .map_err(|e| PipelineError::Catalog {
                url: url.clone(),
                message: format!("invalid catalog JSON: {e}"),
            })
    })
}

/// Flat-map deliveries × items into download descriptors.
pub fn build_descriptors(
    product: &Product,
    base_url: &str,
    download_dir: &Path,
) -> Vec<DownloadDescriptor> {
    let base = base_url.trim_end_matches('/');
    product
        .deliveries
        .iter()
        .flat_map(|delivery| {
            delivery.items.iter().map(move |item| DownloadDescriptor {
                filename: item.item_name.clone(),
                file_path: download_dir.join(&item.item_name),
                expected_size: parse_file_size(&item.file_size),
                checksum: item.file_checksum.clone(),
                url: format!(
                    "{base}/products/{}/delivery/{}/item/{}/download",
                    product.id, delivery.delivery_id, item.item_id
                ),
            })
        })
        .collect()
}

static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)(?:[.,](\d+))?\s*([A-Za-z]*)$").expect("invalid size regex")
});

/// Parse a human-readable size string ("12.3 MB", "2,5 kb", "1024") into
/// bytes. Anything unrecognized, including an unknown unit, is 0.
pub fn parse_file_size(s: &str) -> u64 {
    let s = s.trim();
    let Some(caps) = SIZE_RE.captures(s) else {
        return 0;
    };

    let multiplier = unit_multiplier(caps.get(3).map_or("", |m| m.as_str()));

    let Ok(whole) = caps[1].parse::<u64>() else {
        return 0;
    };

    let fraction = match caps.get(2) {
        None => 0,
        Some(frac) => {
            let digits = frac.as_str().len() as u32;
            let (Ok(decimal), Some(scale)) =
                (frac.as_str().parse::<u64>(), 10u64.checked_pow(digits))
            else {
                return 0;
            };
            (decimal as u128 * multiplier as u128 / scale as u128) as u64
        }
    };

    whole.saturating_mul(multiplier).saturating_add(fraction)
}

fn unit_multiplier(unit: &str) -> u64 {
    match unit.trim().to_ascii_uppercase().as_str() {
        "TB" | "TIB" | "T" => 1 << 40,
        "GB" | "GIB" | "G" => 1 << 30,
        "MB" | "MIB" | "M" => 1 << 20,
        "KB" | "KIB" | "K" => 1 << 10,
        "B" | "BYTES" | "BYTE" | "" => 1,
        _ => 0,
    }
}
