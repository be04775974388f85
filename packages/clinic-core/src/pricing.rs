//! Precificação de atendimentos
//!
//! O valor total de um atendimento nunca vem do chamador: é sempre a soma dos
//! preços dos procedimentos selecionados na modalidade do atendimento.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::models::{AppointmentType, Procedure};

pub const MSG_NO_PROCEDURES: &str = "Pelo menos um procedimento é obrigatório";
pub const MSG_UNKNOWN_PROCEDURES: &str = "Um ou mais procedimentos não encontrados";
pub const MSG_CARD_REQUIRED: &str = "Número da carteira é obrigatório para tipo 'plano'";
pub const MSG_NEGATIVE_PRICE: &str = "Valores do procedimento não podem ser negativos";

/// Casas decimais dos valores monetários
const MONEY_SCALE: u32 = 2;

/// Procedimentos selecionados e o total calculado
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub procedures: Vec<Procedure>,
    pub total_value: Decimal,
}

/// Normaliza e valida o número da carteira do convênio
///
/// Espaços nas pontas são removidos; uma carteira vazia equivale a nenhuma.
pub fn check_insurance_card(
    kind: AppointmentType,
    card: Option<&str>,
) -> CoreResult<Option<String>> {
    let card = card
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    if kind == AppointmentType::Plan && card.is_none() {
        return Err(CoreError::validation(MSG_CARD_REQUIRED));
    }
    Ok(card)
}

/// Confere se todos os ids pedidos foram resolvidos
///
/// IDs repetidos contam como divergência: o conjunto resolvido fica menor que a
/// lista pedida.
pub fn check_selection(requested: &[Uuid], resolved: Vec<Procedure>) -> CoreResult<Vec<Procedure>> {
    if requested.is_empty() {
        return Err(CoreError::validation(MSG_NO_PROCEDURES));
    }
    if resolved.len() != requested.len() {
        return Err(CoreError::validation(MSG_UNKNOWN_PROCEDURES));
    }
    Ok(resolved)
}

pub fn total_for(procedures: &[Procedure], kind: AppointmentType) -> Decimal {
    procedures
        .iter()
        .map(|p| p.price_for(kind))
        .sum::<Decimal>()
        .round_dp(MONEY_SCALE)
}

/// Valida a seleção e calcula o total para a modalidade
pub fn quote(
    kind: AppointmentType,
    requested: &[Uuid],
    resolved: Vec<Procedure>,
) -> CoreResult<Quote> {
    let procedures = check_selection(requested, resolved)?;
    let total_value = total_for(&procedures, kind);
    Ok(Quote {
        procedures,
        total_value,
    })
}

/// Normaliza um preço de procedimento para duas casas, rejeitando negativos
pub fn normalize_price(price: Decimal) -> CoreResult<Decimal> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(CoreError::validation(MSG_NEGATIVE_PRICE));
    }
    Ok(price.round_dp(MONEY_SCALE))
}
