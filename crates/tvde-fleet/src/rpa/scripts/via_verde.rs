use crate::rpa::steps::{AutomationStep, Key, StepAction};

const LOGIN_URL: &str = "https://www.viaverde.pt/particulares/login";
const STATEMENTS_URL: &str = "https://www.viaverde.pt/particulares/area-cliente/extratos";

/// Customer area login followed by the statement export for the period.
pub(crate) fn steps() -> Vec<AutomationStep> {
    let fill = |descricao: &str, seletor: &str, valor: &str, secreto: bool| {
        AutomationStep::new(
            descricao,
            StepAction::Preencher {
                seletor: seletor.to_string(),
                valor: valor.to_string(),
                secreto,
            },
        )
    };

    vec![
        AutomationStep::new(
            "Abrir login Via Verde",
            StepAction::Navegar {
                url: LOGIN_URL.to_string(),
            },
        ),
        AutomationStep::new(
            "Aceitar cookies",
            StepAction::Clicar {
                seletor: "#onetrust-accept-btn-handler".to_string(),
            },
        )
        .optional()
        .with_timeout(5_000),
        fill("Utilizador", "#txtUsername", "{{username}}", false),
        fill("Password", "#txtPassword", "{{password}}", true),
        AutomationStep::new(
            "Entrar",
            StepAction::PressionarTecla {
                seletor: "#txtPassword".to_string(),
                tecla: Key::Enter,
            },
        ),
        AutomationStep::new(
            "Área de cliente",
            StepAction::AguardarElemento {
                seletor: ".area-cliente".to_string(),
            },
        )
        .with_timeout(60_000),
        AutomationStep::new(
            "Extratos",
            StepAction::Navegar {
                url: STATEMENTS_URL.to_string(),
            },
        ),
        fill("Data início", "#dataInicio", "{{periodo_inicio_pt}}", false),
        fill("Data fim", "#dataFim", "{{periodo_fim_pt}}", false),
        AutomationStep::new(
            "Pesquisar",
            StepAction::Clicar {
                seletor: "#btnPesquisar".to_string(),
            },
        ),
        AutomationStep::new(
            "Resultados",
            StepAction::AguardarElemento {
                seletor: "table.extratos".to_string(),
            },
        ),
        AutomationStep::new(
            "Exportar extrato",
            StepAction::Download {
                seletor: "#btnExportarCsv".to_string(),
                nome_ficheiro: "via_verde_{{periodo_inicio}}_{{periodo_fim}}.csv".to_string(),
            },
        )
        .with_timeout(120_000),
    ]
}
