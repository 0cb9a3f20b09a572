use crate::rpa::steps::{AutomationStep, Condition, StepAction, TwoFactorChannel};

const LOGIN_URL: &str = "https://auth.uber.com/v2/?next_url=https%3A%2F%2Fsupplier.uber.com%2F";
const EMAIL_INPUT: &str = "#PHONE_NUMBER_or_EMAIL_ADDRESS";
const PASSWORD_INPUT: &str = "#PASSWORD";
const CONTINUE: &str = "#forward-button";
const OTP_INPUT: &str = "input[autocomplete='one-time-code']";

/// Supplier portal login followed by the payments report download.
pub(crate) fn steps() -> Vec<AutomationStep> {
    vec![
        AutomationStep::new(
            "Abrir login Uber",
            StepAction::Navegar {
                url: LOGIN_URL.to_string(),
            },
        ),
        AutomationStep::new(
            "Email",
            StepAction::Preencher {
                seletor: EMAIL_INPUT.to_string(),
                valor: "{{username}}".to_string(),
                secreto: false,
            },
        ),
        AutomationStep::new(
            "Continuar",
            StepAction::Clicar {
                seletor: CONTINUE.to_string(),
            },
        ),
        AutomationStep::new(
            "Password",
            StepAction::Preencher {
                seletor: PASSWORD_INPUT.to_string(),
                valor: "{{password}}".to_string(),
                secreto: true,
            },
        ),
        AutomationStep::new(
            "Entrar",
            StepAction::Clicar {
                seletor: CONTINUE.to_string(),
            },
        ),
        AutomationStep::new(
            "Verificação em dois passos",
            StepAction::Condicional {
                condicao: Condition::ElementoExiste {
                    seletor: OTP_INPUT.to_string(),
                },
                entao: vec![
                    AutomationStep::new(
                        "Código 2FA",
                        StepAction::Codigo2fa {
                            seletor: OTP_INPUT.to_string(),
                            canal: TwoFactorChannel::Sms,
                        },
                    ),
                    AutomationStep::new(
                        "Confirmar código",
                        StepAction::Clicar {
                            seletor: CONTINUE.to_string(),
                        },
                    ),
                ],
                senao: Vec::new(),
            },
        ),
        AutomationStep::new(
            "Portal de parceiros",
            StepAction::AguardarElemento {
                seletor: "[data-testid='supplier-navigation']".to_string(),
            },
        )
        .with_timeout(60_000),
        AutomationStep::new(
            "Relatório de pagamentos",
            StepAction::Navegar {
                url: "https://supplier.uber.com/orgs/reports?type=payments_driver&start={{periodo_inicio}}&end={{periodo_fim}}"
                    .to_string(),
            },
        ),
        AutomationStep::new(
            "Gerar relatório",
            StepAction::Clicar {
                seletor: "[data-testid='generate-report']".to_string(),
            },
        )
        .optional(),
        AutomationStep::new(
            "Descarregar CSV",
            StepAction::Download {
                seletor: "[data-testid='download-report']".to_string(),
                nome_ficheiro: "uber_pagamentos_{{periodo_inicio}}_{{periodo_fim}}.csv".to_string(),
            },
        )
        .with_timeout(120_000),
    ]
}
