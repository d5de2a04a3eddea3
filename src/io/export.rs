use std::io::Write;

use anyhow::Result;

use crate::application::LedgerService;
use crate::domain::AccountId;

/// Exporter for converting ledger data to CSV
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export an account's ledger entries to CSV, oldest first.
    /// Returns the number of entries written.
    pub async fn export_entries_csv<W: Write>(
        &self,
        account_id: AccountId,
        writer: W,
    ) -> Result<usize> {
        let entries = self.service.list_entries(account_id).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "account_id",
            "transaction_id",
            "source_type",
            "state",
            "amount",
            "applied_at",
        ])?;

        for entry in &entries {
            csv_writer.write_record([
                entry.id.to_string(),
                entry.account_id.to_string(),
                entry.external_tx_id.clone(),
                entry.source_type.to_string(),
                entry.direction.to_string(),
                entry.amount.to_string(),
                entry.applied_at.to_rfc3339(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(entries.len())
    }
}
