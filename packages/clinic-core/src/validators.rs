//! Validação de identidade: CPF, email, datas e cálculo de idade

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::OnceLock;

/// Idade a partir da qual uma pessoa deixa de ser menor
pub const AGE_OF_MAJORITY: i32 = 18;

/// Formato aceito para `local@dominio.tld`
const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

fn email_regex() -> &'static Regex {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(EMAIL_PATTERN).expect("EMAIL_PATTERN é uma expressão regular válida")
    })
}

/// Remove pontuação do CPF, mantendo apenas os dígitos
pub fn strip_cpf(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Valida formato e dígitos verificadores de um CPF
///
/// Aceita CPFs com ou sem pontuação (`111.444.777-35`). Sequências de um único
/// dígito repetido são rejeitadas mesmo tendo dígitos verificadores coerentes.
pub fn validate_cpf(raw: &str) -> bool {
    let digits: Vec<u32> = raw.chars().filter_map(|c| c.to_digit(10)).collect();

    if digits.len() != 11 {
        return false;
    }

    if digits.iter().all(|d| *d == digits[0]) {
        return false;
    }

    let first = check_digit(&digits[..9], 10);
    let second = check_digit(&digits[..10], 11);

    digits[9] == first && digits[10] == second
}

/// Soma ponderada mod 11 com pesos decrescentes a partir de `initial_weight`
fn check_digit(digits: &[u32], initial_weight: u32) -> u32 {
    let sum: u32 = digits
        .iter()
        .zip((2..=initial_weight).rev())
        .map(|(digit, weight)| digit * weight)
        .sum();
    ((sum * 10) % 11) % 10
}

/// Valida o formato de um endereço de email
pub fn validate_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// Idade completa em anos na data `today`
pub fn age(birth_date: NaiveDate, today: NaiveDate) -> i32 {
    let mut years = today.year() - birth_date.year();
    if (today.month(), today.day()) < (birth_date.month(), birth_date.day()) {
        years -= 1;
    }
    years
}

pub fn is_minor(birth_date: NaiveDate, today: NaiveDate) -> bool {
    age(birth_date, today) < AGE_OF_MAJORITY
}

/// Interpreta uma data no formato `YYYY-MM-DD`
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Interpreta data e hora ISO 8601, com ou sem segundos
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];

    let raw = raw.trim();
    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

/// Limite de filtro por período: data e hora, ou só a data (meia-noite)
pub fn parse_period_bound(raw: &str) -> Option<NaiveDateTime> {
    parse_datetime(raw).or_else(|| parse_date(raw).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_known_cpf_vectors() {
        assert!(validate_cpf("11144477735"));
        assert!(validate_cpf("111.444.777-35"));
        assert!(validate_cpf("52998224725"));
        assert!(!validate_cpf("11144477736"));
    }

    #[test]
    fn test_cpf_rejects_wrong_length_and_repeated_digits() {
        assert!(!validate_cpf(""));
        assert!(!validate_cpf("1114447773"));
        assert!(!validate_cpf("111444777355"));
        for d in 0..=9 {
            let repeated = d.to_string().repeat(11);
            assert!(!validate_cpf(&repeated), "{} deveria ser inválido", repeated);
        }
    }

    #[test]
    fn test_cpf_single_digit_mutation_is_invalid() {
        let valid = "11144477735";
        for position in 0..11 {
            for replacement in '0'..='9' {
                let mut mutated: Vec<char> = valid.chars().collect();
                if mutated[position] == replacement {
                    continue;
                }
                mutated[position] = replacement;
                let mutated: String = mutated.into_iter().collect();
                assert!(!validate_cpf(&mutated), "{} não deveria ser válido", mutated);
            }
        }
    }

    #[test]
    fn test_strip_cpf() {
        assert_eq!(strip_cpf("111.444.777-35"), "11144477735");
        assert_eq!(strip_cpf(" 111 444 777 35 "), "11144477735");
    }

    #[test]
    fn test_email_format() {
        assert!(validate_email("maria.silva@clinica.med.br"));
        assert!(validate_email("joao+agenda@exemplo.com"));
        assert!(!validate_email("maria@clinica"));
        assert!(!validate_email("maria@clinica.c"));
        assert!(!validate_email("@clinica.com"));
        assert!(!validate_email("maria silva@clinica.com"));
    }

    #[test]
    fn test_age_boundary() {
        let today = date(2024, 6, 15);

        assert_eq!(age(date(2006, 6, 15), today), 18);
        assert!(!is_minor(date(2006, 6, 15), today));

        assert_eq!(age(date(2006, 6, 16), today), 17);
        assert!(is_minor(date(2006, 6, 16), today));
    }

    #[test]
    fn test_age_leap_day_birthday() {
        // Nascido em 29/02 completa aniversário em 01/03 nos anos comuns
        assert_eq!(age(date(2004, 2, 29), date(2022, 2, 28)), 17);
        assert_eq!(age(date(2004, 2, 29), date(2022, 3, 1)), 18);
    }

    #[test]
    fn test_parse_date_and_datetime() {
        assert_eq!(parse_date("2010-05-20"), Some(date(2010, 5, 20)));
        assert_eq!(parse_date("20/05/2010"), None);
        assert_eq!(parse_date("2010-02-30"), None);

        let expected = date(2024, 3, 1).and_hms_opt(14, 30, 0).unwrap();
        assert_eq!(parse_datetime("2024-03-01T14:30:00"), Some(expected));
        assert_eq!(parse_datetime("2024-03-01T14:30"), Some(expected));
        assert_eq!(parse_datetime("2024-03-01 14:30"), Some(expected));
        assert_eq!(parse_datetime("amanhã"), None);
    }

    #[test]
    fn test_period_bound_accepts_plain_dates() {
        assert_eq!(
            parse_period_bound("2024-03-01"),
            date(2024, 3, 1).and_hms_opt(0, 0, 0)
        );
        assert_eq!(
            parse_period_bound("2024-03-01T08:15"),
            date(2024, 3, 1).and_hms_opt(8, 15, 0)
        );
        assert_eq!(parse_period_bound("março"), None);
    }
}
