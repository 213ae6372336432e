//! Generate mock input records

use anyhow::{bail, Result};
use clap::Args;
use stagewise_common::data::save_records;
use stagewise_common::MockDataGenerator;
use std::path::PathBuf;

use crate::output::print_success;

#[derive(Args)]
pub struct GenerateArgs {
    /// Number of records
    #[arg(short, long, default_value = "100")]
    pub records: usize,

    /// Output JSON file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Schema name written into the records' payload
    #[arg(long, default_value = "customer")]
    pub schema: String,

    /// Seed for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn execute(args: GenerateArgs) -> Result<()> {
    if args.records == 0 {
        bail!("--records must be at least 1");
    }

    let mut generator = match args.seed {
        Some(seed) => MockDataGenerator::with_seed(seed),
        None => MockDataGenerator::new(),
    };
    let schema = MockDataGenerator::sample_schema(&args.schema);
    let records = generator.generate_records(&schema, args.records);
    save_records(&args.output, &records)?;

    print_success(&format!(
        "Wrote {} {} records to {}",
        records.len(),
        schema.name,
        args.output.display()
    ));
    Ok(())
}
