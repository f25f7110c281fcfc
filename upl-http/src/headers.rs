//! Encoding and decoding of the 402 challenge body and the `X-Payment` header.

use http::HeaderValue;
use upl::UplError;
use upl::proto::{PaymentProof, PaymentRequirement, ProofDecodeError};

/// Encodes a [`PaymentProof`] as the value of the `X-Payment` header.
///
/// # Errors
///
/// Returns [`UplError::Validation`] if the proof cannot be serialized or is
/// not a valid header value.
pub fn encode_x_payment(proof: &PaymentProof) -> Result<HeaderValue, UplError> {
    let encoded = proof
        .encode()
        .map_err(|e| UplError::validation(format!("cannot encode payment proof: {e}")))?;
    HeaderValue::from_str(&encoded)
        .map_err(|e| UplError::validation(format!("invalid X-Payment header value: {e}")))
}

/// Decodes an `X-Payment` header value into a [`PaymentProof`].
///
/// # Errors
///
/// Returns [`ProofDecodeError`] on non-UTF-8, base64 or JSON failure.
pub fn decode_x_payment(value: &HeaderValue) -> Result<PaymentProof, ProofDecodeError> {
    PaymentProof::decode(&String::from_utf8_lossy(value.as_bytes()))
}

/// Decodes the JSON body of a 402 response.
///
/// # Errors
///
/// Returns [`UplError::InvalidResponse`] if the body is not a payment requirement.
pub fn decode_payment_requirement(body: &[u8]) -> Result<PaymentRequirement, UplError> {
    serde_json::from_slice(body)
        .map_err(|e| UplError::invalid_response(format!("402 body is not a payment requirement: {e}")))
}
