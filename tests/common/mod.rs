#![allow(dead_code)]

use adax::signing::{SignPart, encode_big_endian, RequestSigner};
use sha1::{Digest, Sha1};
use signature::DigestVerifier;
use wiremock::Request;

/// 1024-bit DSA test key, PKCS#8 DER in hex.
pub const TEST_KEY: &str = "3082014a0201003082012b06072a8648ce3804013082011e0281810081ceea6ba4703f71540e4a761f25ec44d810648b57a4356529f71b80746e5457b9f6735128c2a8efaae91d7d10421622fd8dda44342b8d5ac1784d1f121e2d846f781d9509b13d5cdd5835e63e1f64adad04e1d3ff101053a59628d26505fa93032a77475a596fc3d5a828d27f0a0755d6cb34aa19dceac7ea10ff8bf36d3de5021500a257135098f8776c242f9f68252f8bc175e56ad502818052e34be75f0ef509c681b5e9a2625c1143439b4450d20c51b61b37b3867b37ddf8b9dd3c8c782c80af710aa175c790936b9f3b85a574492eb967969e04226cc066a9fb190a8b968445704b86506ddf33216c06564c2775f0f99bacb86b666ad2c57f280075cd0a40569962f848df58409991a25a45f97402a50135315ff2834e04160214149c88f8331d46d3e4614993aef3fbe44cbab8ea";

pub const LOGIN_ID: i64 = 7;

/// Value of one form field in a captured request body.
pub fn form_field(request: &Request, name: &str) -> Option<String> {
    let body = String::from_utf8(request.body.clone()).ok()?;
    body.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        if k != name {
            return None;
        }
        urlencoding::decode(v).ok().map(|v| v.into_owned())
    })
}

/// Check a colon-hex signature against the test key's public half.
pub fn signature_verifies(colon_hex: &str, parts: &[SignPart<'_>]) -> bool {
    let Ok(der) = hex::decode(colon_hex.replace(':', "")) else {
        return false;
    };
    let Ok(sig) = dsa::Signature::try_from(der.as_slice()) else {
        return false;
    };
    let signer = RequestSigner::from_hex(TEST_KEY).unwrap();
    signer
        .verifying_key()
        .verify_digest(Sha1::new_with_prefix(encode_big_endian(parts)), &sig)
        .is_ok()
}
