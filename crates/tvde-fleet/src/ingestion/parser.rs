use chrono::NaiveDateTime;
use csv::StringRecord;

use super::columns::{self, ColumnMap};
use super::normalizer::normalize_name;
use super::records::{
    ChargingRecord, EarningRecord, FuelRecord, ParseOutcome, ParsedBatch, TollRecord,
};
use super::values::{parse_amount, parse_count, parse_datetime, sniff_delimiter};
use super::ImportError;
use crate::fleet::{DataCategory, Period, Platform};

/// Dispatches to the parser matching the platform's data category.
pub fn parse_for_platform(
    platform: Platform,
    input: &str,
    period: Period,
) -> Result<(ParsedBatch, usize), ImportError> {
    Ok(match platform.category() {
        DataCategory::Earnings => {
            let outcome = match platform {
                Platform::Bolt => parse_bolt_earnings(input, period)?,
                _ => parse_uber_earnings(input, period)?,
            };
            (ParsedBatch::Earnings(outcome.records), outcome.skipped)
        }
        DataCategory::Tolls => {
            let outcome = parse_via_verde(input)?;
            (ParsedBatch::Tolls(outcome.records), outcome.skipped)
        }
        DataCategory::Fuel => {
            let outcome = parse_fuel(input)?;
            (ParsedBatch::Fuel(outcome.records), outcome.skipped)
        }
        DataCategory::Charging => {
            let outcome = parse_charging(input)?;
            (ParsedBatch::Charging(outcome.records), outcome.skipped)
        }
    })
}

/// Uber payments export, aggregated per driver.
pub fn parse_uber_earnings(
    input: &str,
    period: Period,
) -> Result<ParseOutcome<EarningRecord>, ImportError> {
    let (layout, rows) = read_rows(input)?;
    let uuid = layout.find(columns::UBER_DRIVER_UUID);
    let first_name = layout.find(columns::UBER_FIRST_NAME);
    let last_name = layout.find(columns::UBER_LAST_NAME);
    let full_name = layout.find(columns::DRIVER_FULL_NAME);
    if uuid.is_none() && first_name.is_none() && full_name.is_none() {
        return Err(ImportError::MissingColumn("motorista"));
    }
    let gross = layout.require("ganhos", columns::UBER_GROSS)?;
    let tips = layout.find(columns::UBER_TIPS);
    let fee = layout.find(columns::UBER_FEE);
    let net = layout.find(columns::UBER_NET);
    let trips = layout.find(columns::TRIPS);

    let mut aggregate = EarningsAggregate::default();
    for row in &rows {
        let name = match (row.text(first_name), row.text(last_name)) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(first), None) => Some(first.to_string()),
            _ => row.text(full_name).map(str::to_string),
        };
        let driver_ref = row.text(uuid).map(str::to_string);
        if driver_ref.is_none() && name.is_none() {
            aggregate.skipped += 1;
            continue;
        }

        let gross = row.amount("ganhos", Some(gross))?;
        let platform_fee = row.amount("taxa", fee)?.abs();
        aggregate.add(EarningRecord {
            platform: Platform::Uber,
            driver_ref,
            driver_name: name,
            period,
            gross,
            tips: row.amount("gratificacao", tips)?,
            platform_fee,
            net: match net.and_then(|index| row.text(Some(index))) {
                Some(_) => row.amount("liquido", net)?,
                None => gross - platform_fee,
            },
            trips: row.count("viagens", trips)?,
        });
    }
    Ok(aggregate.finish())
}

/// Bolt fleet earnings export; net falls back to gross minus commission.
pub fn parse_bolt_earnings(
    input: &str,
    period: Period,
) -> Result<ParseOutcome<EarningRecord>, ImportError> {
    let (layout, rows) = read_rows(input)?;
    let driver_id = layout.find(columns::BOLT_DRIVER_ID);
    let name = layout.find(columns::DRIVER_FULL_NAME);
    if driver_id.is_none() && name.is_none() {
        return Err(ImportError::MissingColumn("motorista"));
    }
    let gross = layout.require("ganhos brutos", columns::BOLT_GROSS)?;
    let commission = layout.find(columns::BOLT_COMMISSION);
    let tips = layout.find(columns::BOLT_TIPS);
    let net = layout.find(columns::BOLT_NET);
    let trips = layout.find(columns::TRIPS);

    let mut aggregate = EarningsAggregate::default();
    for row in &rows {
        let driver_ref = row.text(driver_id).map(str::to_string);
        let driver_name = row.text(name).map(str::to_string);
        if driver_ref.is_none() && driver_name.is_none() {
            aggregate.skipped += 1;
            continue;
        }

        let gross = row.amount("ganhos brutos", Some(gross))?;
        let platform_fee = row.amount("comissao", commission)?.abs();
        let net = match net.and_then(|index| row.text(Some(index))) {
            Some(_) => row.amount("ganhos liquidos", net)?,
            None => gross - platform_fee,
        };
        aggregate.add(EarningRecord {
            platform: Platform::Bolt,
            driver_ref,
            driver_name,
            period,
            gross,
            tips: row.amount("gorjetas", tips)?,
            platform_fee,
            net,
            trips: row.count("viagens", trips)?,
        });
    }
    Ok(aggregate.finish())
}

/// Via Verde statement: one line per toll passage.
pub fn parse_via_verde(input: &str) -> Result<ParseOutcome<TollRecord>, ImportError> {
    let (layout, rows) = read_rows(input)?;
    let plate = layout.find(columns::PLATE);
    let obu = layout.find(columns::OBU);
    if plate.is_none() && obu.is_none() {
        return Err(ImportError::MissingColumn("matricula"));
    }
    let date = layout.require("data", columns::TOLL_DATE)?;
    let amount = layout.require("valor", columns::AMOUNT)?;
    let entry = layout.find(columns::TOLL_ENTRY);
    let exit = layout.find(columns::TOLL_EXIT);

    let mut outcome = ParseOutcome {
        records: Vec::new(),
        skipped: 0,
    };
    for row in &rows {
        let Some(identifier) = row.text(plate).or_else(|| row.text(obu)) else {
            outcome.skipped += 1;
            continue;
        };
        outcome.records.push(TollRecord {
            plate_or_obu: identifier.to_string(),
            entry: row.text(entry).map(str::to_string),
            exit: row.text(exit).map(str::to_string),
            occurred_at: row.datetime(date)?,
            amount: row.amount("valor", Some(amount))?,
        });
    }
    Ok(outcome)
}

pub fn parse_fuel(input: &str) -> Result<ParseOutcome<FuelRecord>, ImportError> {
    let (layout, rows) = read_rows(input)?;
    let card = layout.require("cartao", columns::CARD)?;
    let date = layout.require("data", columns::TRANSACTION_DATE)?;
    let amount = layout.require("valor", columns::AMOUNT)?;
    let plate = layout.find(columns::PLATE);
    let station = layout.find(columns::STATION);
    let litres = layout.find(columns::LITRES);

    let mut outcome = ParseOutcome {
        records: Vec::new(),
        skipped: 0,
    };
    for row in &rows {
        let Some(card) = row.text(Some(card)) else {
            outcome.skipped += 1;
            continue;
        };
        outcome.records.push(FuelRecord {
            card: card.to_string(),
            plate: row.text(plate).map(str::to_string),
            occurred_at: row.datetime(date)?,
            station: row.text(station).map(str::to_string),
            litres: row.amount("litros", litres)?,
            amount: row.amount("valor", Some(amount))?,
        });
    }
    Ok(outcome)
}

pub fn parse_charging(input: &str) -> Result<ParseOutcome<ChargingRecord>, ImportError> {
    let (layout, rows) = read_rows(input)?;
    let card = layout.require("cartao", columns::CARD)?;
    let date = layout.require("data", columns::TRANSACTION_DATE)?;
    let amount = layout.require("valor", columns::AMOUNT)?;
    let station = layout.find(columns::STATION);
    let kwh = layout.find(columns::KWH);

    let mut outcome = ParseOutcome {
        records: Vec::new(),
        skipped: 0,
    };
    for row in &rows {
        let Some(card) = row.text(Some(card)) else {
            outcome.skipped += 1;
            continue;
        };
        outcome.records.push(ChargingRecord {
            card: card.to_string(),
            occurred_at: row.datetime(date)?,
            station: row.text(station).map(str::to_string),
            kwh: row.amount("kwh", kwh)?,
            amount: row.amount("valor", Some(amount))?,
        });
    }
    Ok(outcome)
}

struct Row {
    record: StringRecord,
    /// 1-based line in the file, header included.
    line: usize,
}

impl Row {
    fn text(&self, index: Option<usize>) -> Option<&str> {
        index
            .and_then(|index| self.record.get(index))
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn amount(&self, column: &'static str, index: Option<usize>) -> Result<f64, ImportError> {
        let raw = self.text(index).unwrap_or_default();
        parse_amount(raw).ok_or_else(|| ImportError::InvalidValue {
            line: self.line,
            column,
            value: raw.to_string(),
        })
    }

    fn count(&self, column: &'static str, index: Option<usize>) -> Result<u32, ImportError> {
        let raw = self.text(index).unwrap_or_default();
        parse_count(raw).ok_or_else(|| ImportError::InvalidValue {
            line: self.line,
            column,
            value: raw.to_string(),
        })
    }

    fn datetime(&self, index: usize) -> Result<NaiveDateTime, ImportError> {
        let raw = self.text(Some(index)).unwrap_or_default();
        parse_datetime(raw).ok_or_else(|| ImportError::InvalidDate {
            line: self.line,
            value: raw.to_string(),
        })
    }
}

fn read_rows(input: &str) -> Result<(ColumnMap, Vec<Row>), ImportError> {
    let body = input.trim_start_matches('\u{feff}');
    if body.trim().is_empty() {
        return Err(ImportError::Empty);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(body))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(body.as_bytes());
    let columns = ColumnMap::new(reader.headers()?);

    let mut rows = Vec::new();
    for (offset, record) in reader.records().enumerate() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        rows.push(Row {
            record,
            line: offset + 2,
        });
    }
    Ok((columns, rows))
}

/// Sums rows belonging to the same driver, keeping first-seen order.
#[derive(Default)]
struct EarningsAggregate {
    records: Vec<EarningRecord>,
    skipped: usize,
}

impl EarningsAggregate {
    fn key(record: &EarningRecord) -> String {
        match (&record.driver_ref, &record.driver_name) {
            (Some(reference), _) => reference.to_ascii_lowercase(),
            (None, Some(name)) => normalize_name(name),
            (None, None) => String::new(),
        }
    }

    fn add(&mut self, record: EarningRecord) {
        let key = Self::key(&record);
        match self
            .records
            .iter_mut()
            .find(|existing| Self::key(existing) == key)
        {
            Some(existing) => {
                existing.gross += record.gross;
                existing.tips += record.tips;
                existing.platform_fee += record.platform_fee;
                existing.net += record.net;
                existing.trips = existing.trips.saturating_add(record.trips);
                if existing.driver_name.is_none() {
                    existing.driver_name = record.driver_name;
                }
            }
            None => self.records.push(record),
        }
    }

    fn finish(self) -> ParseOutcome<EarningRecord> {
        ParseOutcome {
            records: self.records,
            skipped: self.skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn week() -> Period {
        Period::week_of(NaiveDate::from_ymd_opt(2025, 3, 10).expect("date"))
    }

    #[test]
    fn uber_export_joins_split_names_and_aggregates_rows() {
        let csv = "\u{feff}UUID do motorista;Nome próprio do motorista;Apelido do motorista;Pago a si : Os seus ganhos;Pago a si : Os seus ganhos : Gratificação;Taxa de serviço;Viagens\n\
                   abc-1;João;Silva;400,00;10,00;-100,00;20\n\
                   abc-1;João;Silva;100,50;0;-25,00;5\n\
                   ;;;50,00;0;0;1\n";
        let outcome = parse_uber_earnings(csv, week()).expect("parses");
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.records.len(), 1);

        let record = &outcome.records[0];
        assert_eq!(record.driver_ref.as_deref(), Some("abc-1"));
        assert_eq!(record.driver_name.as_deref(), Some("João Silva"));
        assert_eq!(record.gross, 500.5);
        assert_eq!(record.platform_fee, 125.0);
        assert_eq!(record.net, 375.5);
        assert_eq!(record.trips, 25);
    }

    #[test]
    fn bolt_net_defaults_to_gross_minus_commission() {
        let csv = "Motorista,Ganhos brutos (total)|€,Comissão|€,Gorjetas|€,Viagens\n\
                   Ana Costa,\"1.200,00\",240.00,15,60\n";
        let outcome = parse_bolt_earnings(csv, week()).expect("parses");
        let record = &outcome.records[0];
        assert_eq!(record.gross, 1200.0);
        assert_eq!(record.platform_fee, 240.0);
        assert_eq!(record.net, 960.0);
        assert_eq!(record.tips, 15.0);
    }

    #[test]
    fn aggregated_trip_counts_saturate() {
        let csv = "Motorista,Ganhos brutos (total)|€,Comissão|€,Viagens\n\
                   Ana Costa,10.00,2.00,4000000000\n\
                   Ana Costa,10.00,2.00,4000000000\n";
        let outcome = parse_bolt_earnings(csv, week()).expect("parses");
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].trips, u32::MAX);
        assert_eq!(outcome.records[0].gross, 20.0);
    }

    #[test]
    fn missing_gross_column_is_reported() {
        let csv = "Motorista;Viagens\nAna;3\n";
        let error = parse_bolt_earnings(csv, week()).expect_err("gross missing");
        assert!(matches!(error, ImportError::MissingColumn("ganhos brutos")));
    }

    #[test]
    fn via_verde_rows_use_plate_then_obu() {
        let csv = "Matrícula;Identificador;Entrada;Saída;Data de saída;Valor (€)\n\
                   AA-12-BB;;Lisboa;Porto;14/03/2025 08:15;22,35\n\
                   ;OBU-77;A5;A5;2025-03-15;1,90\n\
                   ;;;;2025-03-15;3,00\n";
        let outcome = parse_via_verde(csv).expect("parses");
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.records[0].plate_or_obu, "AA-12-BB");
        assert_eq!(outcome.records[0].amount, 22.35);
        assert_eq!(outcome.records[1].plate_or_obu, "OBU-77");
    }

    #[test]
    fn invalid_amount_names_line_and_column() {
        let csv = "Cartão;Data;Valor\nC-1;2025-03-14;abc\n";
        let error = parse_fuel(csv).expect_err("bad amount");
        assert_eq!(
            error.to_string(),
            "invalid value 'abc' in column 'valor' at line 2"
        );
    }

    #[test]
    fn charging_export_parses_energy() {
        let csv = "Cartão,Data de início,Posto,Energia (kWh),Custo (€)\n\
                   EV-9,2025-03-12 21:04,MOBI.E Oriente,\"32,5\",\"11,20\"\n";
        let outcome = parse_charging(csv).expect("parses");
        assert_eq!(outcome.records[0].kwh, 32.5);
        assert_eq!(outcome.records[0].amount, 11.2);
        assert_eq!(outcome.records[0].station.as_deref(), Some("MOBI.E Oriente"));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(parse_fuel("  \n"), Err(ImportError::Empty)));
    }
}
