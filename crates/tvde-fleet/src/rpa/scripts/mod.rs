//! Built-in portal scripts. Partners cannot edit these.

mod uber;
mod via_verde;

use serde::Serialize;

use super::browser::DownloadedFile;
use super::steps::AutomationStep;
use crate::fleet::{Period, Platform};
use crate::ingestion::{parse_uber_earnings, parse_via_verde, ImportError, ParsedBatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorScript {
    Uber,
    ViaVerde,
}

impl VendorScript {
    pub fn for_platform(platform: Platform) -> Option<Self> {
        match platform {
            Platform::Uber => Some(Self::Uber),
            Platform::ViaVerde => Some(Self::ViaVerde),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Uber => "uber_pagamentos",
            Self::ViaVerde => "via_verde_extrato",
        }
    }

    pub const fn platform(self) -> Platform {
        match self {
            Self::Uber => Platform::Uber,
            Self::ViaVerde => Platform::ViaVerde,
        }
    }

    pub fn steps(self) -> Vec<AutomationStep> {
        match self {
            Self::Uber => uber::steps(),
            Self::ViaVerde => via_verde::steps(),
        }
    }

    /// Parses the file the script downloaded; returns the batch and skipped rows.
    pub fn parse(
        self,
        file: &DownloadedFile,
        period: Period,
    ) -> Result<(ParsedBatch, usize), ImportError> {
        let text = file.text();
        Ok(match self {
            Self::Uber => {
                let outcome = parse_uber_earnings(&text, period)?;
                (ParsedBatch::Earnings(outcome.records), outcome.skipped)
            }
            Self::ViaVerde => {
                let outcome = parse_via_verde(&text)?;
                (ParsedBatch::Tolls(outcome.records), outcome.skipped)
            }
        })
    }
}
