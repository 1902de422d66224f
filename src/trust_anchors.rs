//! Compiled-in RSA trust anchors for firmware signature checks.
//!
//! Two tiers: the engineering keys sign pre-production firmware; the
//! production set supports rotation, so a signature is accepted when any
//! key of the selected tier validates. Which tier applies is the caller's
//! policy, never auto-detected. The tables are immutable and parsed once.

use lazy_static::lazy_static;
use rsa::pkcs8::DecodePublicKey as _;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};

use crate::pki::{self, VerifyError};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum KeyTier {
    /// Pre-production signing.
    Engineering,
    /// Rotatable production set; multiple keys may be concurrently valid.
    Production,
}

/// 3072-bit pre-production signing key.
const ENGINEERING_3K: &str = "\
-----BEGIN PUBLIC KEY-----
MIIBojANBgkqhkiG9w0BAQEFAAOCAY8AMIIBigKCAYEAyhaj18TgLfCgYd6yXWi4
2kHUYtsbqL4fveMp8+hMLExuqiKU11pBoGgVNqkCQ9RXnc5wolMDKYvItDvPSNJj
Ip0l2voM11oAQWXAPy6TIAVOZTshRMYbzVfrecdeUCyojmgVpKTmUBLRKLVcayXz
Uoq2OjIEZluqF8FwRzK2tkPe8bVhNMVO/dE8Jptgu/j6bdQbmSzvZPY8btz5Bvlo
sccMKVkWtdnMGoEmiv5VfjEwY7PxosEIqZPqG8wpMvzjppwGMG2htwQLrIGoKeRp
Gq4cZmAIMS5wvdHcL+AY7t8IP77mZz7OzzlQk+uYtyAktplcPvCFFd6rhwAjZTfl
gOpw0hI7fCIA0lSRL+TATmKiSlYu5vLtkg/KOH7ItaY20/dyXTLJ7+8wkEwNyRfP
X2Nitg1fpYbHguNjTIKnLyKioXVxwNi3mMIj1ZISJSqUY9koULSQGmavNwKjHYpX
wpsloqbdBKIXQC7gTUUpEerWXn4HDtVRm3qAz3A/bXKRAgMBAAE=
-----END PUBLIC KEY-----
";

/// 2048-bit pre-production signing key.
const ENGINEERING_2K: &str = "\
-----BEGIN PUBLIC KEY-----
MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAony7196aeitgE0SU5NPz
fro6XeKR7Z3yB4WAQ+YlXXLz/qZ0KmbaTHhb36aiBUWg2Z6emGztBC/fTJQ8WTz6
9Nolp2+ydic8NgDGTrja2h4x/2VmATf7TtZ0tqRZIEAzn+5Arg9uPKrKseTkIu1X
ieuu87r/yUC4qhVLTk7STUaUw0sE9zxA1v4YrHXNI43FLKQbX4PwkEoImpP5hcnr
bDy/lLrO0TFS/Vh3QquTedrLCjnGgwBqLRkuBcRvSE0d0OCIZH7hdqEe6f+lq3wj
PJMika7Ndyh6HZAoAgD1bLnqbi38WK4Z7LEZZ2LF/BZZuQOp+SzFHDJlV1mIQzNb
6wIDAQAB
-----END PUBLIC KEY-----
";

const PRODUCTION_0: &str = "\
-----BEGIN PUBLIC KEY-----
MIIBojANBgkqhkiG9w0BAQEFAAOCAY8AMIIBigKCAYEAum0B1Y+kTcuIakI4OkRE
Bf40ADir8I+jli9zMDYVvD7gAC8L6FSdfdMY/2AkJFZc7DHq9C09+Nxh9zyO6R4O
dBILndcTjxZFGdwA8hNzjBkeQo+8s1Ec+Ahku/BOJM31AUmocHAhyzSM+CFzfUfX
aX2u4KjvQZL/OR6mFPOOVH0fj91j/CP5pm29/W2Jz61sMDCA2iku1VD75kHR73GV
mYh6CYvQzvr/BMvudrzvDlsMeK67PMd7Xj7pLEusEW3j4hVy6gj6uCXrbhb9MJU5
6n181iJm1ybLSFsBRr78wMS6uM60fWLpdrs+pLe3c5EQiZ5UYi5LHxe/kCZ39bGc
qeR1VOWp+it5tHSUcNsWVzYaM2ty18ICXlW9f/dMIQPBFBg16SwOm4uAWSeDRCrq
vBNZmwx8boByJ1QO2z/r2sQXqzX2Car5QzSxaW0UVapIzOacPkyr/9sG7wlbJ8hu
g5h2UtWXUJu/vButayrJ8aVQXhbRQKBECHmkylAlHovJAgMBAAE=
-----END PUBLIC KEY-----
";

const PRODUCTION_1: &str = "\
-----BEGIN PUBLIC KEY-----
MIIBojANBgkqhkiG9w0BAQEFAAOCAY8AMIIBigKCAYEAx0QXs+t4dlMHCEA0ISnf
EONaRIpf99NQl1H3+Ajz6Z5HVScx2uOrd7HaWT0LTvnWl4ELvdqf9Bl+sySZDsrv
HiP5ar61l3DXpa2BfaGqx0l2wY/Z+A9wDXjg+Bo+urXD00ovfZAB0iWNNsW9Qe8Z
5a1RZSKuTSXXKUfG2hfyCA3m22P8YCyw3N4n8FhBqbRVMfgFCIyKAFJ+0CrH3F0k
yMJ6Eq1pDqWPzI+YvmAS0kW87md2Ykc4djG7JPymFbyo6IbAuvWfM7bLO/dasEQj
wKZHZbtyiE9zC/GDECsj/Aw9F3obFFVAWGX2ISnzKeMKBoDoKVDFql57T8E6lZju
9hOtAK8Yq/yGfFvxTOOX2HqkuPiU6WMnzJpDIeejmoOouAO3pW99IC6Kbvruoy0q
0uOvEbfjeT5c3JlgHqIfacgw0FnnGSR15hwBM7TFrA4XH/vxJygRaaoCzH7FWqmo
ZBmkelvvgIZKwBdrlHgfpcUZteU8yCLrqhXTzNqAkPfzAgMBAAE=
-----END PUBLIC KEY-----
";

const PRODUCTION_2: &str = "\
-----BEGIN PUBLIC KEY-----
MIIBojANBgkqhkiG9w0BAQEFAAOCAY8AMIIBigKCAYEA3yUbNEx4f2btSZlQ23kY
odg/ggClo5xMZo16vbTjHq4qYQO59+UFGb3X9WnFAUQPmh3EvuXNrA/lYghLEf6G
L51ktwM2Hs2krBQp+3gk/yY0XW6O3uMe88jebnbIiajG+Ee2a2PsQVcc4dSdtRvx
EOupZKUXIUqll8pgZccYHhvOOLgZu7qdxXnjS84SNRMry1nV6aWAkP5YStAaE3T3
R/KvlfOiXHQSuthUrQPm7y2mw1S/TQIjVlW985bXU69aycLKzIg4Sz2lObwajBU6
WOq0kKrg3NDabctZobjihJxC9eey6dwrzFRoPREBPup+XzBVbEBN4Wsd932XYksx
R1vopLwRyXc0/RKIJC7y9jxaNwkqTQEv7zWM423oCWhiyfrso27Cjv4Lx/UbBwlW
AKbnTj+HV20cQ938vhWEB3+pEEEleb+ln8/UKmQ+XjhUbkrymnuUn6QG+h4F3jQJ
b8XZrLBvq+3Gtk7qD6SNX19P4ktFgl+Y7HS5EqCrXl99AgMBAAE=
-----END PUBLIC KEY-----
";

const PRODUCTION_3: &str = "\
-----BEGIN PUBLIC KEY-----
MIIBojANBgkqhkiG9w0BAQEFAAOCAY8AMIIBigKCAYEAyRmBwRXN0qEF1jWWhHYL
qUS/C2KV2wH5IVPSwWTrdizOl03u+FtaebNYgxJlGZ69nYjkqYUAcdMES7hCJ9Bs
wiM7ErEMJyLzlm70gtCTOOweIVnqUayK0dOdntSavITvLTt+9QcLIElmVn5o7Mp2
y7i0p5Kc97Jriiv3omgTucIu+T7beRfpqQvmOHcnlf2cgwv+AElpJe8hvIK8YRuQ
Y2wfSV6B2tqAyF/SJdXWi6DEVcFnd5IgHtp079QZBB7Zx1UQQQ4VT0437F+vcj/F
ZLh3KS5/PcVaLl9nk/RMNnMhlG8K8iLg+Eg/dyds11sfrMsUwGwOKAyoXa6o+UQ7
WYjF6QAvN6Mi5mi1V/VBRke5lAP1WR1ZnYKv0XgsRmsA43guUVHUQcPIZ1LZ4UG0
SM8dyUPAXnMUE1Bn2hzKTGn7Bhm3/eXebnE5p/0PoxN4mWsK+jcxZMCFNd/Ab7IN
SCOCJ7suL9kutd5nmFriYDWCemRnPUOTEShjN2xqf6ktAgMBAAE=
-----END PUBLIC KEY-----
";

const ENGINEERING_PEMS: &[&str] = &[ENGINEERING_3K, ENGINEERING_2K];
const PRODUCTION_PEMS: &[&str] = &[PRODUCTION_0, PRODUCTION_1, PRODUCTION_2, PRODUCTION_3];

lazy_static! {
    static ref ENGINEERING_KEYS: Vec<RsaPublicKey> = import(ENGINEERING_PEMS);
    static ref PRODUCTION_KEYS: Vec<RsaPublicKey> = import(PRODUCTION_PEMS);
}

fn import(pems: &[&str]) -> Vec<RsaPublicKey> {
    pems.iter()
        .map(|anchor| {
            let der = pem::parse(anchor).expect("compiled-in trust anchor is valid PEM");
            RsaPublicKey::from_public_key_der(&der.contents)
                .expect("compiled-in trust anchor is an RSA public key")
        })
        .collect()
}

pub fn keys(tier: KeyTier) -> &'static [RsaPublicKey] {
    match tier {
        KeyTier::Engineering => &ENGINEERING_KEYS,
        KeyTier::Production => &PRODUCTION_KEYS,
    }
}

/// Verify `signature` over `payload` against every anchor of `tier`.
pub fn verify(tier: KeyTier, payload: &[u8], signature: &[u8]) -> Result<(), VerifyError> {
    pki::verify_any(payload, keys(tier), signature)
}

#[cfg(test)]
mod test {
    use super::*;
    use rsa::PublicKeyParts as _;

    #[test]
    fn anchors_import() {
        assert_eq!(keys(KeyTier::Engineering).len(), 2);
        assert_eq!(keys(KeyTier::Production).len(), 4);
    }

    #[test]
    fn anchors_are_distinct() {
        let all: Vec<_> = keys(KeyTier::Engineering)
            .iter()
            .chain(keys(KeyTier::Production))
            .collect();
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.n(), b.n());
            }
        }
    }

    #[test]
    fn unknown_signature_is_rejected_by_both_tiers() {
        for tier in [KeyTier::Engineering, KeyTier::Production] {
            let err = verify(tier, b"payload", &[0u8; 384]).unwrap_err();
            assert!(matches!(err, VerifyError::SignatureInvalid));
        }
    }
}
