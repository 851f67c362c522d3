use rand_core::{OsRng, RngCore};

pub const IDENTITY_DOMAIN: &str = "anonymous.user";

/// Source of the disposable identity attached to every upstream call.
pub trait IdentityProvider: Send + Sync {
    fn new_identity(&self) -> String;
}

/// Email-shaped identities with a 128-bit local part from the OS CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdentity;

impl IdentityProvider for RandomIdentity {
    fn new_identity(&self) -> String {
        let mut local = [0u8; 16];
        OsRng.fill_bytes(&mut local);
        format!("{}@{IDENTITY_DOMAIN}", hex::encode(local))
    }
}

/// Always hands out the same identity. Useful where calls must be reproducible.
#[derive(Debug, Clone)]
pub struct FixedIdentity(pub String);

impl IdentityProvider for FixedIdentity {
    fn new_identity(&self) -> String {
        self.0.clone()
    }
}
