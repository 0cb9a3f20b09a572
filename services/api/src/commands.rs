use chrono::{Duration, NaiveDate};
use clap::{Args, Subcommand};
use std::path::PathBuf;
use tvde_fleet::commission::{PlanTier, StatementService, WeeklyStatement};
use tvde_fleet::error::AppError;
use tvde_fleet::fleet::{
    Assignment, ContractKind, DocumentKind, DocumentUpload, Energy, FleetService, FleetStores,
    NewDriver, NewPartner, NewVehicle, Period, Platform,
};
use tvde_fleet::ingestion::{
    parse_for_platform, EarningRecord, LedgerEntry, LedgerItem, LedgerStore, ParsedBatch,
    TollRecord,
};
use tvde_fleet::rpa::{validate_steps, AutomationError, AutomationInput};
use tvde_fleet::store::new_id;

#[derive(Args, Debug)]
pub(crate) struct ImportArgs {
    /// Platform the export comes from (uber, bolt, via_verde, combustivel, carregamento)
    #[arg(long, value_parser = crate::infra::parse_platform)]
    pub(crate) platform: Platform,
    /// CSV export to parse
    #[arg(long)]
    pub(crate) csv: PathBuf,
    /// First day of the import period
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) from: NaiveDate,
    /// Last day of the import period
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) to: NaiveDate,
}

#[derive(Subcommand, Debug)]
pub(crate) enum AutomationCommand {
    /// Check an automation definition file without storing it
    Validate(ValidateArgs),
}

#[derive(Args, Debug)]
pub(crate) struct ValidateArgs {
    /// JSON file holding an automation definition
    #[arg(long)]
    pub(crate) file: PathBuf,
}

#[derive(Args, Debug)]
pub(crate) struct StatementArgs {
    /// Any day of the week to compute (Monday to Sunday)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) week_start: NaiveDate,
}

pub(crate) fn run_import(args: ImportArgs) -> Result<(), AppError> {
    let period = Period::new(args.from, args.to).ok_or_else(|| {
        AppError::Validation(format!("--from {} is after --to {}", args.from, args.to))
    })?;
    let input = std::fs::read_to_string(&args.csv)?;
    let (batch, skipped) = parse_for_platform(args.platform, &input, period)?;

    println!(
        "{} export {} ({} to {})",
        args.platform.info().label,
        args.csv.display(),
        period.start,
        period.end
    );
    println!("  records: {}", batch.len());
    println!("  skipped rows: {skipped}");
    for line in batch_summary(&batch) {
        println!("  {line}");
    }
    Ok(())
}

fn batch_summary(batch: &ParsedBatch) -> Vec<String> {
    match batch {
        ParsedBatch::Earnings(records) => {
            let gross: f64 = records.iter().map(|r| r.gross).sum();
            let net: f64 = records.iter().map(|r| r.net).sum();
            let trips: u32 = records.iter().map(|r| r.trips).sum();
            let mut lines = vec![
                format!("gross: {gross:.2} EUR"),
                format!("net: {net:.2} EUR"),
                format!("trips: {trips}"),
            ];
            for record in records {
                let who = record
                    .driver_name
                    .as_deref()
                    .or(record.driver_ref.as_deref())
                    .unwrap_or("?");
                lines.push(format!("- {who}: {:.2} gross, {:.2} net", record.gross, record.net));
            }
            lines
        }
        ParsedBatch::Tolls(records) => {
            let amount: f64 = records.iter().map(|r| r.amount).sum();
            vec![format!("tolls: {amount:.2} EUR")]
        }
        ParsedBatch::Fuel(records) => {
            let amount: f64 = records.iter().map(|r| r.amount).sum();
            let litres: f64 = records.iter().map(|r| r.litres).sum();
            vec![format!("fuel: {amount:.2} EUR over {litres:.1} l")]
        }
        ParsedBatch::Charging(records) => {
            let amount: f64 = records.iter().map(|r| r.amount).sum();
            let kwh: f64 = records.iter().map(|r| r.kwh).sum();
            vec![format!("charging: {amount:.2} EUR over {kwh:.1} kWh")]
        }
    }
}

pub(crate) fn run_automation(command: AutomationCommand) -> Result<(), AppError> {
    match command {
        AutomationCommand::Validate(args) => {
            let raw = std::fs::read_to_string(&args.file)?;
            let input = validate_definition(&raw)?;
            println!(
                "{}: {} step(s) for {} are valid",
                input.name,
                input.steps.len(),
                input.platform.slug()
            );
            Ok(())
        }
    }
}

fn validate_definition(raw: &str) -> Result<AutomationInput, AppError> {
    let input: AutomationInput = serde_json::from_str(raw)
        .map_err(|err| AppError::Validation(format!("invalid automation file: {err}")))?;
    if input.name.trim().is_empty() {
        return Err(AutomationError::MissingName.into());
    }
    validate_steps(&input.steps)?;
    Ok(input)
}

pub(crate) fn run_statement(args: StatementArgs) -> Result<(), AppError> {
    let statement = sample_statement(args.week_start)?;
    render_statement(&statement);
    Ok(())
}

/// Builds a throwaway partner with one commission driver and computes the week.
fn sample_statement(day: NaiveDate) -> Result<WeeklyStatement, AppError> {
    let week = Period::week_of(day);
    let fleet = FleetService::new(FleetStores::in_memory());
    let ledger = LedgerStore::default();

    let partner = fleet.create_partner(NewPartner {
        name: "Frota Demonstração".to_string(),
        nif: "501442600".to_string(),
        email: "geral@frota-demo.pt".to_string(),
        phone: None,
        plan: PlanTier::Essencial,
        approval_limit: None,
    })?;
    let driver = fleet.register_driver(
        &partner.id,
        NewDriver {
            name: "Rui Almeida".to_string(),
            nif: "123456789".to_string(),
            email: "rui@example.pt".to_string(),
            phone: None,
            licence_number: "P-123456".to_string(),
            licence_expiry: week.end + Duration::days(365 * 5),
            tvde_certificate_expiry: None,
            iban: None,
            uber_uuid: None,
            bolt_id: None,
        },
    )?;
    for kind in DocumentKind::mandatory() {
        fleet.attach_document(
            &partner.id,
            &driver.id,
            DocumentUpload {
                kind,
                storage_path: None,
                valid_until: None,
            },
        )?;
    }
    let contract_start = week.start - Duration::weeks(4);
    fleet.activate_driver(&partner.id, &driver.id, contract_start)?;
    let vehicle = fleet.register_vehicle(
        &partner.id,
        NewVehicle {
            plate: "AB-12-CD".to_string(),
            make: "Toyota".to_string(),
            model: "Corolla Hybrid".to_string(),
            year: 2022,
            energy: Energy::Hibrido,
            via_verde_obu: None,
            fuel_card: None,
            charging_card: None,
            insurance_expiry: None,
            inspection_expiry: None,
        },
    )?;
    fleet.assign_vehicle(
        &partner.id,
        &vehicle.id,
        Assignment {
            driver_id: driver.id.clone(),
            kind: ContractKind::Comissao { percentage: None },
            start: contract_start,
            deposit: 0.0,
        },
    )?;

    let entry = |platform: Platform, occurred_on: NaiveDate, item: LedgerItem| LedgerEntry {
        id: new_id(),
        partner_id: partner.id.clone(),
        platform,
        period: week,
        sync_log_id: "demo".to_string(),
        driver_id: Some(driver.id.clone()),
        vehicle_id: Some(vehicle.id.clone()),
        occurred_on,
        item,
    };
    ledger.replace_import(
        &partner.id,
        Platform::Uber,
        week,
        vec![entry(
            Platform::Uber,
            week.start,
            LedgerItem::Earning(EarningRecord {
                platform: Platform::Uber,
                driver_ref: None,
                driver_name: Some(driver.name.clone()),
                period: week,
                gross: 820.0,
                tips: 12.5,
                platform_fee: 205.0,
                net: 627.5,
                trips: 64,
            }),
        )],
    )?;
    let toll_day = week.start + Duration::days(2);
    ledger.replace_import(
        &partner.id,
        Platform::ViaVerde,
        week,
        vec![entry(
            Platform::ViaVerde,
            toll_day,
            LedgerItem::Toll(TollRecord {
                plate_or_obu: vehicle.plate.clone(),
                entry: Some("Porto".to_string()),
                exit: Some("Aveiro".to_string()),
                occurred_at: toll_day.and_hms_opt(8, 30, 0).unwrap_or_default(),
                amount: 9.85,
            }),
        )],
    )?;

    let statements = StatementService::in_memory(fleet, ledger);
    Ok(statements.generate(&partner.id, week.start)?)
}

fn render_statement(statement: &WeeklyStatement) {
    println!(
        "Weekly statement {} to {} ({})",
        statement.period.start,
        statement.period.end,
        statement.status.label()
    );
    for line in &statement.lines {
        println!("- {} [{}]", line.driver_name, line.classification);
        println!("    trips: {}", line.trips);
        println!("    gross: {:.2}  net: {:.2}", line.gross, line.net);
        if let Some(pct) = line.commission_pct {
            println!("    commission: {pct:.1}% = {:.2}", line.partner_share);
        } else {
            println!("    partner share: {:.2}", line.partner_share);
        }
        println!(
            "    tolls: {:.2}  fuel: {:.2}  charging: {:.2}",
            line.tolls, line.fuel, line.charging
        );
        println!("    balance: {:.2}", line.balance);
    }
    println!("Total payable: {:.2} EUR", statement.totals.payable);
}
