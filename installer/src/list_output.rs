//! Output formatting for package listing.
//!
//! This module formats install receipts for human-readable or JSON output.

use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::receipt::{Receipt, ReceiptListing};

/// Format installed packages for human-readable output.
///
/// # Examples
///
/// ```
/// use parcel_installer::list_output::format_human;
/// use parcel_installer::receipt::ReceiptListing;
///
/// let output = format_human(&ReceiptListing::default());
/// assert!(output.contains("No packages installed"));
/// ```
#[must_use]
pub fn format_human(listing: &ReceiptListing) -> String {
    let mut output = if listing.receipts.is_empty() {
        String::from("No packages installed.\n\nRun `parcel install <recipe>` to install one.\n")
    } else {
        let mut output = String::from("Installed packages:\n");
        for receipt in &listing.receipts {
            output.push('\n');
            push_line(
                &mut output,
                format_args!("  {} {} ({})", receipt.name, receipt.version, receipt.platform),
            );
            for path in &receipt.installed_paths {
                push_line(&mut output, format_args!("    {}", path.display()));
            }
        }
        output
    };

    if !listing.corrupt.is_empty() {
        output.push_str("\nUnreadable receipts:\n");
        for path in &listing.corrupt {
            push_line(&mut output, format_args!("  {}", path.display()));
        }
    }

    output
}

fn push_line(output: &mut String, line: std::fmt::Arguments<'_>) {
    if writeln!(output, "{line}").is_err() {
        // Writing to a String cannot fail.
    }
}

/// Format installed packages as JSON.
///
/// # Examples
///
/// ```
/// use parcel_installer::list_output::format_json;
/// use parcel_installer::receipt::ReceiptListing;
///
/// let json = format_json(&ReceiptListing::default());
/// assert!(json.contains("\"packages\""));
/// ```
#[must_use]
pub fn format_json(listing: &ReceiptListing) -> String {
    let json_data = ListingJson {
        packages: &listing.receipts,
        corrupt: &listing.corrupt,
    };
    serde_json::to_string_pretty(&json_data).unwrap_or_else(|_| "{}".to_owned())
}

/// JSON-serializable view of the receipt store.
#[derive(Debug, Serialize)]
struct ListingJson<'a> {
    /// Installed packages, sorted by name.
    packages: &'a [Receipt],
    /// Receipt files that could not be parsed.
    corrupt: &'a [PathBuf],
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_listing() -> ReceiptListing {
        ReceiptListing {
            receipts: vec![Receipt {
                name: "ballerina".to_owned(),
                version: "2201.8.0".to_owned(),
                platform: "linux-x64".to_owned(),
                url: "https://dist.example.org/ballerina.zip".to_owned(),
                digest: "ab".repeat(32),
                installed_paths: vec![PathBuf::from("/home/u/.local/bin/bal")],
                installed_at: 1_700_000_000,
            }],
            corrupt: Vec::new(),
        }
    }

    #[test]
    fn human_lists_packages_and_paths() {
        let output = format_human(&sample_listing());
        assert!(output.starts_with("Installed packages:"));
        assert!(output.contains("  ballerina 2201.8.0 (linux-x64)\n"));
        assert!(output.contains("    /home/u/.local/bin/bal\n"));
        assert!(!output.contains("Unreadable"));
    }

    #[test]
    fn human_reports_corrupt_receipts() {
        let mut listing = ReceiptListing::default();
        listing.corrupt.push(PathBuf::from("/data/receipts/bad.json"));

        let output = format_human(&listing);
        assert!(output.contains("No packages installed"));
        assert!(output.contains("Unreadable receipts:\n  /data/receipts/bad.json"));
    }

    #[test]
    fn json_round_trips_receipt_fields() {
        let json = format_json(&sample_listing());
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid JSON");

        let package = &value["packages"][0];
        assert_eq!(package["name"], "ballerina");
        assert_eq!(package["version"], "2201.8.0");
        assert_eq!(package["installed_paths"][0], "/home/u/.local/bin/bal");
        assert_eq!(value["corrupt"], serde_json::json!([]));
    }
}
