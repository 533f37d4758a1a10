use super::{ResultData, Transformer};
use crate::client::CapturedResponse;
use crate::TransformResult;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Stores the body bytes unchanged
pub struct BinaryTransformer;

impl Transformer for BinaryTransformer {
    fn name(&self) -> &str {
        "binary"
    }

    fn transform(&self, response: CapturedResponse) -> TransformResult<ResultData> {
        let bytes = response.body_bytes()?;
        Ok(ResultData::new(self.name(), None, bytes))
    }
}

/// Stores the body as standard base64 text
pub struct Base64Transformer;

impl Transformer for Base64Transformer {
    fn name(&self) -> &str {
        "base64"
    }

    fn transform(&self, response: CapturedResponse) -> TransformResult<ResultData> {
        let bytes = response.body_bytes()?;
        let encoded = STANDARD.encode(bytes);
        Ok(ResultData::new(
            self.name(),
            Some("UTF-8".to_string()),
            encoded.into_bytes(),
        ))
    }
}
