use serde::{Deserialize, Serialize};

/// One entry of an automation script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationStep {
    #[serde(default)]
    pub descricao: String,
    /// Failures of optional steps are logged and skipped.
    #[serde(default)]
    pub opcional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(flatten)]
    pub acao: StepAction,
}

impl AutomationStep {
    pub fn new(descricao: impl Into<String>, acao: StepAction) -> Self {
        Self {
            descricao: descricao.into(),
            opcional: false,
            timeout_ms: None,
            acao,
        }
    }

    pub fn optional(mut self) -> Self {
        self.opcional = true;
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn label(&self) -> &str {
        if self.descricao.trim().is_empty() {
            self.acao.tipo()
        } else {
            &self.descricao
        }
    }
}

/// Action dispatched on the `tipo` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tipo", rename_all = "snake_case")]
pub enum StepAction {
    Navegar {
        url: String,
    },
    Clicar {
        seletor: String,
    },
    Preencher {
        seletor: String,
        valor: String,
        #[serde(default)]
        secreto: bool,
    },
    Selecionar {
        seletor: String,
        valor: String,
    },
    PressionarTecla {
        seletor: String,
        tecla: Key,
    },
    Aguardar {
        milissegundos: u64,
    },
    AguardarElemento {
        seletor: String,
    },
    Screenshot {
        nome: String,
    },
    Download {
        seletor: String,
        nome_ficheiro: String,
    },
    ExtrairTexto {
        seletor: String,
        variavel: String,
    },
    ExtrairTabela {
        seletor: String,
        variavel: String,
    },
    #[serde(rename = "codigo_2fa")]
    Codigo2fa {
        seletor: String,
        #[serde(default)]
        canal: TwoFactorChannel,
    },
    Condicional {
        condicao: Condition,
        #[serde(default)]
        entao: Vec<AutomationStep>,
        #[serde(default)]
        senao: Vec<AutomationStep>,
    },
}

impl StepAction {
    pub const fn tipo(&self) -> &'static str {
        match self {
            Self::Navegar { .. } => "navegar",
            Self::Clicar { .. } => "clicar",
            Self::Preencher { .. } => "preencher",
            Self::Selecionar { .. } => "selecionar",
            Self::PressionarTecla { .. } => "pressionar_tecla",
            Self::Aguardar { .. } => "aguardar",
            Self::AguardarElemento { .. } => "aguardar_elemento",
            Self::Screenshot { .. } => "screenshot",
            Self::Download { .. } => "download",
            Self::ExtrairTexto { .. } => "extrair_texto",
            Self::ExtrairTabela { .. } => "extrair_tabela",
            Self::Codigo2fa { .. } => "codigo_2fa",
            Self::Condicional { .. } => "condicional",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Key {
    #[serde(alias = "enter", alias = "ENTER")]
    Enter,
    #[serde(alias = "tab", alias = "TAB")]
    Tab,
    #[serde(alias = "escape", alias = "ESCAPE", alias = "Esc")]
    Escape,
}

impl Key {
    /// WebDriver key code point.
    pub const fn code(self) -> &'static str {
        match self {
            Self::Enter => "\u{E007}",
            Self::Tab => "\u{E004}",
            Self::Escape => "\u{E00C}",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TwoFactorChannel {
    #[default]
    Sms,
    Email,
    App,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tipo", rename_all = "snake_case")]
pub enum Condition {
    ElementoExiste { seletor: String },
    ElementoAusente { seletor: String },
    UrlContem { valor: String },
    TextoContem { seletor: String, valor: String },
    VariavelIgual { variavel: String, valor: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepValidationError {
    #[error("an automation needs at least one step")]
    NoSteps,
    #[error("step {step}: field '{field}' cannot be empty")]
    EmptyField { step: String, field: &'static str },
    #[error("step {0}: conditionals cannot be nested")]
    NestedConditional(String),
    #[error("step {0}: a conditional needs at least one branch")]
    EmptyConditional(String),
}

/// Checks a step list before it is stored or run.
pub fn validate_steps(steps: &[AutomationStep]) -> Result<(), StepValidationError> {
    if steps.is_empty() {
        return Err(StepValidationError::NoSteps);
    }
    for (index, step) in steps.iter().enumerate() {
        validate_step(step, &(index + 1).to_string(), false)?;
    }
    Ok(())
}

fn validate_step(
    step: &AutomationStep,
    path: &str,
    in_branch: bool,
) -> Result<(), StepValidationError> {
    let non_empty = |value: &str, field: &'static str| {
        if value.trim().is_empty() {
            Err(StepValidationError::EmptyField {
                step: path.to_string(),
                field,
            })
        } else {
            Ok(())
        }
    };

    match &step.acao {
        StepAction::Navegar { url } => non_empty(url, "url"),
        StepAction::Clicar { seletor }
        | StepAction::AguardarElemento { seletor }
        | StepAction::PressionarTecla { seletor, .. }
        | StepAction::Codigo2fa { seletor, .. } => non_empty(seletor, "seletor"),
        StepAction::Preencher { seletor, .. } | StepAction::Selecionar { seletor, .. } => {
            non_empty(seletor, "seletor")
        }
        StepAction::Aguardar { .. } => Ok(()),
        StepAction::Screenshot { nome } => non_empty(nome, "nome"),
        StepAction::Download {
            seletor,
            nome_ficheiro,
        } => {
            non_empty(seletor, "seletor")?;
            non_empty(nome_ficheiro, "nome_ficheiro")
        }
        StepAction::ExtrairTexto { seletor, variavel }
        | StepAction::ExtrairTabela { seletor, variavel } => {
            non_empty(seletor, "seletor")?;
            non_empty(variavel, "variavel")
        }
        StepAction::Condicional {
            condicao,
            entao,
            senao,
        } => {
            if in_branch {
                return Err(StepValidationError::NestedConditional(path.to_string()));
            }
            if entao.is_empty() && senao.is_empty() {
                return Err(StepValidationError::EmptyConditional(path.to_string()));
            }
            match condicao {
                Condition::ElementoExiste { seletor }
                | Condition::ElementoAusente { seletor }
                | Condition::TextoContem { seletor, .. } => non_empty(seletor, "seletor")?,
                Condition::UrlContem { valor } => non_empty(valor, "valor")?,
                Condition::VariavelIgual { variavel, .. } => non_empty(variavel, "variavel")?,
            }
            for (index, inner) in entao.iter().enumerate() {
                validate_step(inner, &format!("{path}.entao.{}", index + 1), true)?;
            }
            for (index, inner) in senao.iter().enumerate() {
                validate_step(inner, &format!("{path}.senao.{}", index + 1), true)?;
            }
            Ok(())
        }
    }
}
