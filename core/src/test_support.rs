//! Mock implementations of platform traits for testing

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use crate::error::{ApiError, Result};
use crate::platform::{Cache, Clock, Environment, HttpClient, HttpResponse};

pub const BROKER: &str = "https://broker.example";
pub const RP: &str = "https://rp.example";

/// Mock cache backed by an in-memory HashMap
pub struct MockCache {
    store: Mutex<HashMap<String, Vec<u8>>>,
}

impl MockCache {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Cache for MockCache {
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let store = self.store.lock().unwrap();
        Ok(store.get(key).cloned())
    }

    async fn put_bytes(&self, key: &str, value: &[u8], _ttl_secs: u64) -> Result<()> {
        self.store.lock().unwrap().insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// Mock HTTP client with pre-configured responses, matched by URL substring
pub struct MockHttp {
    responses: Vec<(String, HttpResponse)>,
    requests: Mutex<Vec<String>>,
}

impl MockHttp {
    pub fn new(responses: Vec<(String, HttpResponse)>) -> Self {
        Self {
            responses,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// URLs requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for MockHttp {
    async fn get(&self, url: &str, _headers: &[(&str, &str)]) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(url.to_string());
        for (pattern, response) in &self.responses {
            if url.contains(pattern) {
                return Ok(HttpResponse {
                    status: response.status,
                    body: response.body.clone(),
                });
            }
        }
        Err(ApiError::upstream(format!("no mock response for GET {}", url)))
    }
}

/// Mock clock with a fixed timestamp
pub struct MockClock(pub u64);

impl Clock for MockClock {
    fn now_secs(&self) -> u64 {
        self.0
    }
}

/// Mock environment backed by an in-memory HashMap
pub struct MockEnv {
    vars: HashMap<String, String>,
}

impl MockEnv {
    pub fn new(vars: HashMap<String, String>) -> Self {
        Self { vars }
    }
}

impl Environment for MockEnv {
    fn get_var(&self, name: &str) -> Result<String> {
        self.vars
            .get(name)
            .cloned()
            .ok_or_else(|| ApiError::internal(format!("variable '{}' not found", name)))
    }
}

/// RSA signing key playing the broker's part
pub struct TestKey {
    pub kid: String,
    pub n: String,
    pub e: String,
    private_pem: String,
}

impl TestKey {
    /// Generate a fresh RSA key pair at runtime (never touches disk)
    fn generate(kid: &str) -> Self {
        use rand::rngs::OsRng;
        use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
        use rsa::traits::PublicKeyParts;
        use rsa::RsaPrivateKey;

        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).expect("key generation failed");
        let private_pem = private_key
            .to_pkcs1_pem(LineEnding::LF)
            .expect("private key PEM export failed")
            .to_string();
        let public_key = private_key.to_public_key();

        Self {
            kid: kid.to_string(),
            n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
            private_pem,
        }
    }

    /// Public half as a broker JWK
    pub fn jwk(&self) -> serde_json::Value {
        serde_json::json!({
            "kid": self.kid,
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "n": self.n,
            "e": self.e,
        })
    }

    /// Sign claims as RS256 with this key's kid in the header
    pub fn sign(&self, claims: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        self.sign_with_header(header, claims)
    }

    pub fn sign_with_header(&self, header: Header, claims: &serde_json::Value) -> String {
        let key = EncodingKey::from_rsa_pem(self.private_pem.as_bytes()).expect("invalid test key");
        encode(&header, claims, &key).expect("signing failed")
    }
}

/// Key the test broker publishes
pub fn test_key() -> &'static TestKey {
    static KEY: OnceLock<TestKey> = OnceLock::new();
    KEY.get_or_init(|| TestKey::generate("test-key-1"))
}

/// Key the test broker does not publish
pub fn other_test_key() -> &'static TestKey {
    static KEY: OnceLock<TestKey> = OnceLock::new();
    KEY.get_or_init(|| TestKey::generate("test-key-2"))
}

/// Broker serving discovery and a JWKS with the given keys
pub fn broker_http(keys: &[&TestKey]) -> MockHttp {
    let discovery = serde_json::json!({
        "issuer": BROKER,
        "jwks_uri": format!("{}/keys.json", BROKER),
    });
    let jwks = serde_json::json!({
        "keys": keys.iter().map(|k| k.jwk()).collect::<Vec<_>>(),
    });

    MockHttp::new(vec![
        (
            "/.well-known/openid-configuration".to_string(),
            HttpResponse {
                status: 200,
                body: discovery.to_string().into_bytes(),
            },
        ),
        (
            "/keys.json".to_string(),
            HttpResponse {
                status: 200,
                body: jwks.to_string().into_bytes(),
            },
        ),
    ])
}

/// Claims of a valid token for alice, issued just before `now`
pub fn test_claims(now: u64, nonce: Option<&str>) -> serde_json::Value {
    let mut claims = serde_json::json!({
        "iss": BROKER,
        "aud": RP,
        "sub": "alice@example.com",
        "iat": now - 10,
        "exp": now + 600,
    });
    if let Some(nonce) = nonce {
        claims["nonce"] = serde_json::json!(nonce);
    }
    claims
}
