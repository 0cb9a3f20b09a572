use std::collections::HashMap;

use csv::StringRecord;

use super::normalizer::normalize_header;
use super::ImportError;

// Aliases are stored already normalised (see `normalize_header`).

pub(crate) const UBER_DRIVER_UUID: &[&str] = &[
    "uuid do motorista",
    "driver uuid",
    "uuid motorista",
    "id do motorista",
];
pub(crate) const UBER_FIRST_NAME: &[&str] = &[
    "nome proprio do motorista",
    "driver first name",
    "primeiro nome",
    "nome proprio",
];
pub(crate) const UBER_LAST_NAME: &[&str] = &[
    "apelido do motorista",
    "driver last name",
    "apelido",
    "ultimo nome",
];
pub(crate) const DRIVER_FULL_NAME: &[&str] = &[
    "nome do motorista",
    "driver name",
    "motorista",
    "driver",
    "nome",
];
pub(crate) const UBER_GROSS: &[&str] = &[
    "pago a si : os seus ganhos",
    "os seus ganhos",
    "total de ganhos",
    "ganhos brutos",
    "total earnings",
    "gross earnings",
];
pub(crate) const UBER_TIPS: &[&str] = &[
    "pago a si : os seus ganhos : gratificacao",
    "gratificacao",
    "gratificacoes",
    "gorjetas",
    "tips",
];
pub(crate) const UBER_FEE: &[&str] = &[
    "taxa de servico",
    "taxa uber",
    "comissao uber",
    "service fee",
    "uber fee",
];
pub(crate) const UBER_NET: &[&str] = &[
    "pago a si",
    "total pago",
    "ganhos liquidos",
    "net payout",
    "net earnings",
];
pub(crate) const TRIPS: &[&str] = &[
    "viagens",
    "numero de viagens",
    "total de viagens",
    "viagens concluidas",
    "trips",
    "rides",
];

pub(crate) const BOLT_DRIVER_ID: &[&str] = &[
    "id do motorista",
    "identificador do motorista",
    "driver id",
    "driver uuid",
];
pub(crate) const BOLT_GROSS: &[&str] = &[
    "ganhos brutos (total)",
    "ganhos brutos",
    "gross earnings (total)",
    "gross earnings",
    "total earnings",
];
pub(crate) const BOLT_COMMISSION: &[&str] = &[
    "comissao",
    "comissao bolt",
    "taxa bolt",
    "commission",
    "bolt commission",
];
pub(crate) const BOLT_TIPS: &[&str] = &["gorjetas", "gorjeta", "tips", "tip"];
pub(crate) const BOLT_NET: &[&str] = &[
    "ganhos liquidos",
    "receitas liquidas",
    "net earnings",
    "net payout",
];

pub(crate) const PLATE: &[&str] = &["matricula", "license plate", "plate", "viatura"];
pub(crate) const OBU: &[&str] = &[
    "identificador",
    "obu",
    "dispositivo",
    "identificador via verde",
    "device",
];
pub(crate) const TOLL_ENTRY: &[&str] = &[
    "entrada",
    "local de entrada",
    "praca de entrada",
    "entry",
];
pub(crate) const TOLL_EXIT: &[&str] = &["saida", "local de saida", "praca de saida", "exit"];
pub(crate) const TOLL_DATE: &[&str] = &[
    "data de saida",
    "data/hora",
    "data e hora",
    "data",
    "exit date",
    "date",
];
pub(crate) const AMOUNT: &[&str] = &[
    "valor",
    "montante",
    "importancia",
    "valor total",
    "custo",
    "total",
    "amount",
    "cost",
];

pub(crate) const CARD: &[&str] = &[
    "cartao",
    "n.o cartao",
    "no cartao",
    "numero do cartao",
    "id do cartao",
    "card",
    "card number",
    "card id",
];
pub(crate) const TRANSACTION_DATE: &[&str] = &[
    "data da transacao",
    "data de inicio",
    "data/hora",
    "data e hora",
    "inicio",
    "data",
    "transaction date",
    "start time",
    "date",
];
pub(crate) const STATION: &[&str] = &[
    "posto",
    "estacao",
    "carregador",
    "local",
    "station",
    "charger",
];
pub(crate) const LITRES: &[&str] = &["litros", "quantidade", "volume", "litres", "liters", "quantity"];
pub(crate) const KWH: &[&str] = &[
    "kwh",
    "energia",
    "energia (kwh)",
    "consumo",
    "energy",
    "energy (kwh)",
];

/// Position of every normalised heading in the export.
#[derive(Debug)]
pub(crate) struct ColumnMap {
    index: HashMap<String, usize>,
}

impl ColumnMap {
    pub(crate) fn new(headers: &StringRecord) -> Self {
        let mut index = HashMap::new();
        for (position, header) in headers.iter().enumerate() {
            index.entry(normalize_header(header)).or_insert(position);
        }
        Self { index }
    }

    /// First alias present wins, so aliases are listed most specific first.
    pub(crate) fn find(&self, aliases: &[&str]) -> Option<usize> {
        aliases
            .iter()
            .find_map(|alias| self.index.get(*alias).copied())
    }

    pub(crate) fn require(
        &self,
        field: &'static str,
        aliases: &[&str],
    ) -> Result<usize, ImportError> {
        self.find(aliases).ok_or(ImportError::MissingColumn(field))
    }
}
