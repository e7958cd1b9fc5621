//! Solana JSON-RPC payment rail (no SDK dependency)
//!
//! Transfers are native SOL system-program transfers. Amounts cross this
//! boundary in SOL as `Decimal` and are converted to lamports here.

use async_trait::async_trait;
use base64::Engine;
use ring::signature::{Ed25519KeyPair, KeyPair};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Value, json};

use super::{PaymentRail, SettlementError, TransferStatus};

const LAMPORTS_DECIMALS: u32 = 9;
/// System program id (all-zero public key)
const SYSTEM_PROGRAM: [u8; 32] = [0; 32];
/// System instruction index for `Transfer`
const TRANSFER_INSTRUCTION: u32 = 2;

/// Token name pools settle in
pub const NATIVE_TOKEN: &str = "SOL";
/// Wrapped SOL mint, accepted as another name for the native token
pub const NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";

/// Canonical token name when `token` is something this rail can settle.
/// Only system-program SOL transfers are verified, so SPL mints are refused.
pub fn native_token(token: &str) -> Option<&'static str> {
    let token = token.trim();
    (token.eq_ignore_ascii_case(NATIVE_TOKEN) || token == NATIVE_MINT).then_some(NATIVE_TOKEN)
}

pub fn to_lamports(amount: Decimal) -> Result<u64, SettlementError> {
    let scaled = amount
        .checked_mul(Decimal::from(10u64.pow(LAMPORTS_DECIMALS)))
        .ok_or_else(|| SettlementError::Rejected(format!("{amount} is not a valid SOL amount")))?;
    if scaled.fract() != Decimal::ZERO {
        return Err(SettlementError::Rejected(format!(
            "{amount} has more than {LAMPORTS_DECIMALS} decimal places"
        )));
    }
    scaled
        .to_u64()
        .ok_or_else(|| SettlementError::Rejected(format!("{amount} is not a valid SOL amount")))
}

pub fn from_lamports(lamports: u64) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(lamports), LAMPORTS_DECIMALS).normalize()
}

fn rail_err(e: impl std::fmt::Display) -> SettlementError {
    SettlementError::Rail(e.to_string())
}

fn decode_address(address: &str) -> Result<[u8; 32], SettlementError> {
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|e| SettlementError::Rejected(format!("invalid address {address}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| SettlementError::Rejected(format!("invalid address length: {address}")))
}

/// Server key used to sign escrow payouts
pub struct SigningKey {
    pair: Ed25519KeyPair,
    address: String,
}

impl SigningKey {
    /// Accepts a keypair file body (`[1,2,...]`) or base58. 64 bytes are
    /// seed followed by public key, 32 bytes are the seed alone.
    pub fn from_encoded(encoded: &str) -> Result<Self, SettlementError> {
        let encoded = encoded.trim();
        let bytes: Vec<u8> = if encoded.starts_with('[') {
            serde_json::from_str(encoded)
                .map_err(|e| SettlementError::Signing(format!("invalid keypair JSON: {e}")))?
        } else {
            bs58::decode(encoded)
                .into_vec()
                .map_err(|e| SettlementError::Signing(format!("invalid base58 key: {e}")))?
        };

        let pair = match bytes.len() {
            64 => Ed25519KeyPair::from_seed_and_public_key(&bytes[..32], &bytes[32..]),
            32 => Ed25519KeyPair::from_seed_unchecked(&bytes),
            n => {
                return Err(SettlementError::Signing(format!(
                    "expected a 32 or 64 byte key, got {n}"
                )));
            }
        }
        .map_err(|e| SettlementError::Signing(format!("key rejected: {e}")))?;

        let address = bs58::encode(pair.public_key().as_ref()).into_string();
        Ok(Self { pair, address })
    }

    pub fn from_file(path: &str) -> Result<Self, SettlementError> {
        let body = std::fs::read_to_string(path)
            .map_err(|e| SettlementError::Signing(format!("cannot read {path}: {e}")))?;
        Self::from_encoded(&body)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn public_key(&self) -> [u8; 32] {
        let mut key = [0u8; 32];
        key.copy_from_slice(self.pair.public_key().as_ref());
        key
    }
}

fn push_compact_u16(buf: &mut Vec<u8>, mut n: u16) {
    loop {
        let byte = (n & 0x7f) as u8;
        n >>= 7;
        if n == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Legacy message with a single system transfer from `from` (fee payer) to `to`
fn transfer_message(
    from: &[u8; 32],
    to: &[u8; 32],
    lamports: u64,
    recent_blockhash: &[u8; 32],
) -> Vec<u8> {
    let mut msg = Vec::with_capacity(160);
    // header: 1 signature, 0 read-only signed, 1 read-only unsigned (system program)
    msg.extend_from_slice(&[1, 0, 1]);

    push_compact_u16(&mut msg, 3);
    msg.extend_from_slice(from);
    msg.extend_from_slice(to);
    msg.extend_from_slice(&SYSTEM_PROGRAM);

    msg.extend_from_slice(recent_blockhash);

    push_compact_u16(&mut msg, 1);
    msg.push(2); // program id index
    push_compact_u16(&mut msg, 2);
    msg.extend_from_slice(&[0, 1]);
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&TRANSFER_INSTRUCTION.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    push_compact_u16(&mut msg, data.len() as u16);
    msg.extend_from_slice(&data);
    msg
}

/// First system-program transfer in a `jsonParsed` transaction
fn parse_transfer(tx: &Value) -> Option<(String, String, u64)> {
    tx["transaction"]["message"]["instructions"]
        .as_array()?
        .iter()
        .filter(|ix| ix["program"] == "system" && ix["parsed"]["type"] == "transfer")
        .find_map(|ix| {
            let info = &ix["parsed"]["info"];
            Some((
                info["source"].as_str()?.to_string(),
                info["destination"].as_str()?.to_string(),
                info["lamports"].as_u64()?,
            ))
        })
}

/// `(confirmed, err)` from one entry of `getSignatureStatuses`
fn parse_signature_status(status: &Value) -> (bool, Option<String>) {
    let err = match &status["err"] {
        Value::Null => None,
        other => Some(other.to_string()),
    };
    let confirmed = matches!(
        status["confirmationStatus"].as_str(),
        Some("confirmed" | "finalized")
    );
    (confirmed, err)
}

pub struct SolanaRail {
    client: reqwest::Client,
    rpc_url: String,
    signer: Option<SigningKey>,
}

impl SolanaRail {
    pub fn new(rpc_url: impl Into<String>, signer: Option<SigningKey>) -> Self {
        Self {
            client: reqwest::Client::new(),
            rpc_url: rpc_url.into(),
            signer,
        }
    }

    pub fn signer_address(&self) -> Option<&str> {
        self.signer.as_ref().map(SigningKey::address)
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, SettlementError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let mut resp: Value = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(rail_err)?
            .error_for_status()
            .map_err(rail_err)?
            .json()
            .await
            .map_err(rail_err)?;

        if let Some(err) = resp.get("error") {
            return Err(SettlementError::Rail(format!("{method} failed: {err}")));
        }
        Ok(resp.get_mut("result").map(Value::take).unwrap_or(Value::Null))
    }
}

#[async_trait]
impl PaymentRail for SolanaRail {
    async fn submit_transfer(
        &self,
        from: Option<&str>,
        to: &str,
        amount: Decimal,
    ) -> Result<String, SettlementError> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| SettlementError::Signing("no signing key configured".into()))?;
        if let Some(from) = from
            && from != signer.address()
        {
            return Err(SettlementError::Signing(format!(
                "signing key {} does not control {from}",
                signer.address()
            )));
        }
        if to == signer.address() {
            return Err(SettlementError::Rejected(
                "source and destination are the same".into(),
            ));
        }

        let lamports = to_lamports(amount)?;
        let destination = decode_address(to)?;

        let latest = self
            .call("getLatestBlockhash", json!([{ "commitment": "confirmed" }]))
            .await?;
        let blockhash = latest["value"]["blockhash"]
            .as_str()
            .ok_or_else(|| SettlementError::Rail(format!("unexpected blockhash reply: {latest}")))?;
        let blockhash = decode_address(blockhash)?;

        let message = transfer_message(&signer.public_key(), &destination, lamports, &blockhash);
        let signature = signer.pair.sign(&message);

        let mut tx = Vec::with_capacity(1 + 64 + message.len());
        push_compact_u16(&mut tx, 1);
        tx.extend_from_slice(signature.as_ref());
        tx.extend_from_slice(&message);
        let encoded = base64::engine::general_purpose::STANDARD.encode(&tx);

        let result = self
            .call(
                "sendTransaction",
                json!([encoded, { "encoding": "base64", "preflightCommitment": "confirmed" }]),
            )
            .await?;
        let settlement_ref = result
            .as_str()
            .map(String::from)
            .ok_or_else(|| SettlementError::Rail(format!("unexpected sendTransaction reply: {result}")))?;

        tracing::info!(settlement_ref = %settlement_ref, to, %amount, "Submitted transfer");
        Ok(settlement_ref)
    }

    async fn verify_transfer(
        &self,
        settlement_ref: &str,
    ) -> Result<Option<TransferStatus>, SettlementError> {
        let statuses = self
            .call(
                "getSignatureStatuses",
                json!([[settlement_ref], { "searchTransactionHistory": true }]),
            )
            .await?;
        let status = &statuses["value"][0];
        if status.is_null() {
            return Ok(None);
        }

        let (confirmed, err) = parse_signature_status(status);
        if !confirmed || err.is_some() {
            return Ok(Some(TransferStatus {
                confirmed,
                amount: Decimal::ZERO,
                source: None,
                destination: None,
                err,
            }));
        }

        let tx = self
            .call(
                "getTransaction",
                json!([settlement_ref, {
                    "encoding": "jsonParsed",
                    "commitment": "confirmed",
                    "maxSupportedTransactionVersion": 0,
                }]),
            )
            .await?;
        if tx.is_null() {
            // status visible before the transaction body is queryable
            return Ok(None);
        }

        let Some((source, destination, lamports)) = parse_transfer(&tx) else {
            return Ok(Some(TransferStatus {
                confirmed,
                amount: Decimal::ZERO,
                source: None,
                destination: None,
                err: Some("transaction contains no system transfer".into()),
            }));
        };

        Ok(Some(TransferStatus {
            confirmed,
            amount: from_lamports(lamports),
            source: Some(source),
            destination: Some(destination),
            err: None,
        }))
    }

    async fn get_balance(&self, address: &str) -> Result<Decimal, SettlementError> {
        decode_address(address)?;
        let result = self
            .call("getBalance", json!([address, { "commitment": "confirmed" }]))
            .await?;
        let lamports = result["value"]
            .as_u64()
            .ok_or_else(|| SettlementError::Rail(format!("unexpected getBalance reply: {result}")))?;
        Ok(from_lamports(lamports))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED_KEYPAIR: &str = "[1,2,3,4,5,6,7,8,9,10,11,12,13,14,15,16,17,18,19,20,21,22,23,24,25,26,27,28,29,30,31,32]";

    #[test]
    fn lamport_conversion() {
        assert_eq!(to_lamports("1.5".parse().unwrap()).unwrap(), 1_500_000_000);
        assert_eq!(to_lamports("0.000000001".parse().unwrap()).unwrap(), 1);
        assert!(to_lamports("0.0000000001".parse().unwrap()).is_err());
        assert!(to_lamports("-1".parse().unwrap()).is_err());
        assert_eq!(from_lamports(2_250_000_000), "2.25".parse::<Decimal>().unwrap());
        assert!(to_lamports(Decimal::MAX).is_err());
        assert_eq!(
            to_lamports(crate::validation::MAX_AMOUNT * Decimal::from(100)).unwrap(),
            10_000_000_000_000_000_000
        );
    }

    #[test]
    fn native_token_names() {
        assert_eq!(native_token("SOL"), Some(NATIVE_TOKEN));
        assert_eq!(native_token(" sol "), Some(NATIVE_TOKEN));
        assert_eq!(native_token(NATIVE_MINT), Some(NATIVE_TOKEN));
        assert_eq!(native_token("USDC"), None);
        assert_eq!(native_token("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"), None);
    }

    #[test]
    fn compact_u16_encoding() {
        let cases: [(u16, &[u8]); 4] = [
            (0, &[0x00]),
            (0x7f, &[0x7f]),
            (0x80, &[0x80, 0x01]),
            (0x3fff, &[0xff, 0x7f]),
        ];
        for (n, expected) in cases {
            let mut buf = Vec::new();
            push_compact_u16(&mut buf, n);
            assert_eq!(buf, expected, "encoding {n}");
        }
    }

    #[test]
    fn transfer_message_layout() {
        let from = [1u8; 32];
        let to = [2u8; 32];
        let hash = [9u8; 32];
        let msg = transfer_message(&from, &to, 42, &hash);

        // header(3) + keys(1 + 96) + blockhash(32) + ix count(1)
        // + program idx(1) + accounts(1 + 2) + data(1 + 12)
        assert_eq!(msg.len(), 3 + 97 + 32 + 1 + 1 + 3 + 13);
        assert_eq!(&msg[..4], &[1, 0, 1, 3]);
        assert_eq!(&msg[4..36], &from);
        assert_eq!(&msg[36..68], &to);
        assert_eq!(&msg[100..132], &hash);
        let data = &msg[msg.len() - 12..];
        assert_eq!(&data[..4], &2u32.to_le_bytes());
        assert_eq!(&data[4..], &42u64.to_le_bytes());
    }

    #[test]
    fn signing_key_from_seed() {
        let key = SigningKey::from_encoded(SEED_KEYPAIR).unwrap();
        assert_eq!(decode_address(key.address()).unwrap(), key.public_key());
        assert!(SigningKey::from_encoded("[1,2,3]").is_err());
        assert!(SigningKey::from_encoded("not base58 0OIl").is_err());
    }

    #[test]
    fn parses_jsonparsed_transfer() {
        let tx = json!({
            "transaction": { "message": { "instructions": [
                { "program": "compute-budget", "parsed": null },
                { "program": "system", "parsed": {
                    "type": "transfer",
                    "info": { "source": "A", "destination": "B", "lamports": 5_000_000_000u64 }
                }}
            ]}}
        });
        assert_eq!(
            parse_transfer(&tx),
            Some(("A".into(), "B".into(), 5_000_000_000))
        );
        assert_eq!(parse_transfer(&json!({})), None);
    }

    #[test]
    fn parses_signature_status() {
        let (ok, err) = parse_signature_status(&json!({"confirmationStatus": "finalized", "err": null}));
        assert!(ok);
        assert!(err.is_none());

        let (ok, _) = parse_signature_status(&json!({"confirmationStatus": "processed", "err": null}));
        assert!(!ok);

        let (_, err) = parse_signature_status(
            &json!({"confirmationStatus": "confirmed", "err": {"InstructionError": [0, "Custom"]}}),
        );
        assert!(err.is_some());
    }

    #[tokio::test]
    async fn submit_without_key_is_unavailable() {
        let rail = SolanaRail::new("http://127.0.0.1:1", None);
        assert!(matches!(
            rail.submit_transfer(None, "11111111111111111111111111111111", Decimal::ONE)
                .await,
            Err(SettlementError::Signing(_))
        ));
    }
}
