//! PIX "copia e cola" payloads (EMV QR merchant-presented format).
//!
//! Fields are TLV encoded: two-digit id, two-digit length, value. The payload
//! always ends with field `63` holding a CRC-16/CCITT-FALSE over everything
//! before it, including the literal `6304`.

use rust_decimal::Decimal;

use crate::error::{AppError, AppResult};

const PIX_GUI: &str = "BR.GOV.BCB.PIX";
const MERCHANT_CATEGORY_CODE: &str = "0000";
const CURRENCY_BRL: &str = "986";
const COUNTRY_CODE: &str = "BR";
const DEFAULT_TXID: &str = "***";
const CRC_TAG: &str = "6304";

const MAX_MERCHANT_NAME_LEN: usize = 25;
const MAX_MERCHANT_CITY_LEN: usize = 15;
const MAX_TXID_LEN: usize = 25;
const MAX_FIELD_LEN: usize = 99;

/// CRC-16/CCITT-FALSE: poly 0x1021, init 0xFFFF, no reflection, no final xor.
pub fn crc16_ccitt_false(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixPayload {
    pub key: String,
    pub merchant_name: String,
    pub merchant_city: String,
    /// Omitted from the payload when `None` (payer types the amount).
    pub amount: Option<Decimal>,
    pub txid: Option<String>,
}

impl PixPayload {
    pub fn new(
        key: impl Into<String>,
        merchant_name: impl Into<String>,
        merchant_city: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            merchant_name: merchant_name.into(),
            merchant_city: merchant_city.into(),
            amount: None,
            txid: None,
        }
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_txid(mut self, txid: impl Into<String>) -> Self {
        self.txid = Some(txid.into());
        self
    }

    /// Build the payload string, checksum included.
    pub fn encode(&self) -> AppResult<String> {
        if self.key.trim().is_empty() {
            return Err(AppError::InvalidInput("PIX key is required".to_string()));
        }

        let merchant_account = format!("{}{}", tlv("00", PIX_GUI)?, tlv("01", &self.key)?);

        let mut payload = String::new();
        payload.push_str(&tlv("00", "01")?);
        payload.push_str(&tlv("26", &merchant_account)?);
        payload.push_str(&tlv("52", MERCHANT_CATEGORY_CODE)?);
        payload.push_str(&tlv("53", CURRENCY_BRL)?);
        if let Some(amount) = self.amount {
            payload.push_str(&tlv("54", &format_amount(amount)?)?);
        }
        payload.push_str(&tlv("58", COUNTRY_CODE)?);
        payload.push_str(&tlv(
            "59",
            &truncate_chars(&self.merchant_name, MAX_MERCHANT_NAME_LEN),
        )?);
        payload.push_str(&tlv(
            "60",
            &truncate_chars(&self.merchant_city, MAX_MERCHANT_CITY_LEN),
        )?);

        let txid = self.txid.as_deref().unwrap_or(DEFAULT_TXID);
        validate_txid(txid)?;
        payload.push_str(&tlv("62", &tlv("05", txid)?)?);

        payload.push_str(CRC_TAG);
        let crc = crc16_ccitt_false(payload.as_bytes());
        payload.push_str(&format!("{:04X}", crc));
        Ok(payload)
    }
}

/// Check the trailing `6304XXXX` checksum of a payload.
pub fn verify_pix_payload(payload: &str) -> bool {
    if payload.len() < CRC_TAG.len() + 4 || !payload.is_ascii() {
        return false;
    }
    let (body, checksum) = payload.split_at(payload.len() - 4);
    if !body.ends_with(CRC_TAG) {
        return false;
    }
    let expected = format!("{:04X}", crc16_ccitt_false(body.as_bytes()));
    expected.eq_ignore_ascii_case(checksum)
}

fn tlv(id: &str, value: &str) -> AppResult<String> {
    let len = value.chars().count();
    if len > MAX_FIELD_LEN {
        return Err(AppError::InvalidInput(format!(
            "PIX field {} is {} characters long (max {})",
            id, len, MAX_FIELD_LEN
        )));
    }
    Ok(format!("{}{:02}{}", id, len, value))
}

fn format_amount(amount: Decimal) -> AppResult<String> {
    let mut rounded = amount.round_dp(2);
    if rounded <= Decimal::ZERO {
        return Err(AppError::InvalidInput(
            "PIX amount must be at least 0.01".to_string(),
        ));
    }
    rounded.rescale(2);
    Ok(rounded.to_string())
}

fn validate_txid(txid: &str) -> AppResult<()> {
    if txid == DEFAULT_TXID {
        return Ok(());
    }
    if txid.is_empty()
        || txid.len() > MAX_TXID_LEN
        || !txid.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(AppError::InvalidInput(format!(
            "PIX txid must be 1-{} alphanumeric characters",
            MAX_TXID_LEN
        )));
    }
    Ok(())
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn crc_known_vector() {
        assert_eq!(crc16_ccitt_false(b"123456789"), 0x29B1);
    }

    #[test]
    fn verifies_reference_payload() {
        let payload = "00020126580014br.gov.bcb.pix0136123e4567-e12b-12d1-a456-4266554400005204000053039865802BR5913Fulano de Tal6008BRASILIA62070503***63041D3D";
        assert!(verify_pix_payload(payload));
        assert!(!verify_pix_payload(&payload.replace("1D3D", "1D3E")));
    }

    #[test]
    fn encodes_payload_with_amount() {
        let payload = PixPayload::new("04025752964", "NITOS TRADEHUB STORE", "CURITIBA")
            .with_amount(Decimal::from_str("123.45").unwrap())
            .with_txid("ORDER42")
            .encode()
            .unwrap();

        assert_eq!(
            payload,
            "00020126330014BR.GOV.BCB.PIX0111040257529645204000053039865406123.455802BR5920NITOS TRADEHUB STORE6008CURITIBA62110507ORDER426304578F"
        );
        assert!(verify_pix_payload(&payload));
    }

    #[test]
    fn encodes_payload_without_amount() {
        let payload = PixPayload::new("04025752964", "NITOS TRADEHUB STORE", "CURITIBA")
            .encode()
            .unwrap();

        assert_eq!(
            payload,
            "00020126330014BR.GOV.BCB.PIX0111040257529645204000053039865802BR5920NITOS TRADEHUB STORE6008CURITIBA62070503***6304D64D"
        );
    }

    #[test]
    fn amount_is_rendered_with_two_decimals() {
        assert_eq!(format_amount(Decimal::from(10)).unwrap(), "10.00");
        assert_eq!(format_amount(Decimal::from_str("7.5").unwrap()).unwrap(), "7.50");
        assert!(format_amount(Decimal::from_str("0.004").unwrap()).is_err());
        assert!(format_amount(Decimal::ZERO).is_err());
    }

    #[test]
    fn truncates_long_merchant_fields() {
        let payload = PixPayload::new("key", "A VERY LONG MERCHANT NAME INDEED", "SAO JOSE DOS PINHAIS")
            .encode()
            .unwrap();
        assert!(payload.contains("5925A VERY LONG MERCHANT NAME6015SAO JOSE DOS PI62"));
        assert!(verify_pix_payload(&payload));
    }

    #[test]
    fn rejects_bad_txid_and_missing_key() {
        let result = PixPayload::new("key", "STORE", "CITY")
            .with_txid("has spaces")
            .encode();
        assert!(matches!(result, Err(AppError::InvalidInput(_))));

        let result = PixPayload::new(" ", "STORE", "CITY").encode();
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }
}
