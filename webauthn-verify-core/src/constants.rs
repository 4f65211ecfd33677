use der_parser::oid::Oid;

// Authenticator data flag bits.
pub(crate) const FLAG_USER_PRESENT: u8 = 0x01;
pub(crate) const FLAG_USER_VERIFIED: u8 = 0x04;
pub(crate) const FLAG_BACKUP_ELIGIBLE: u8 = 0x08;
pub(crate) const FLAG_BACKUP_STATE: u8 = 0x10;
pub(crate) const FLAG_ATTESTED_CREDENTIAL_DATA: u8 = 0x40;
pub(crate) const FLAG_EXTENSION_DATA: u8 = 0x80;

pub(crate) const RP_ID_HASH_LEN: usize = 32;
pub(crate) const AAGUID_LEN: usize = 16;

pub(crate) const CLIENT_DATA_TYPE_CREATE: &str = "webauthn.create";
pub(crate) const CLIENT_DATA_TYPE_GET: &str = "webauthn.get";

// Attestation statement format identifiers.
pub(crate) const FMT_NONE: &str = "none";
pub(crate) const FMT_FIDO_U2F: &str = "fido-u2f";
pub(crate) const FMT_PACKED: &str = "packed";
pub(crate) const FMT_TPM: &str = "tpm";
pub(crate) const FMT_ANDROID_KEY: &str = "android-key";
pub(crate) const FMT_ANDROID_SAFETYNET: &str = "android-safetynet";
pub(crate) const FMT_APPLE: &str = "apple";
pub(crate) const FMT_APPLE_APPATTEST: &str = "apple-appattest";

// Certificate extension and attribute object identifiers.
pub(crate) const OID_FIDO_GEN_CE_AAGUID: Oid<'static> = der_parser::oid!(1.3.6 .1 .4 .1 .45724 .1 .1 .4);
pub(crate) const OID_ANDROID_KEY_ATTESTATION: Oid<'static> =
    der_parser::oid!(1.3.6 .1 .4 .1 .11129 .2 .1 .17);
pub(crate) const OID_APPLE_NONCE: Oid<'static> = der_parser::oid!(1.2.840 .113635 .100 .8 .2);
pub(crate) const OID_TCG_KP_AIK_CERTIFICATE: Oid<'static> = der_parser::oid!(2.23.133 .8 .3);

pub(crate) const PACKED_ATTESTATION_OU: &str = "Authenticator Attestation";
// App Attest aaguids are the environment name, zero padded.
pub(crate) const APPLE_APPATTEST_AAGUID_DEVELOPMENT: [u8; 16] = *b"appattestdevelop";
pub(crate) const APPLE_APPATTEST_AAGUID_PRODUCTION: [u8; 16] = *b"appattest\0\0\0\0\0\0\0";

pub(crate) const SAFETYNET_HOSTNAME: &str = "attest.android.com";
pub(crate) const SAFETYNET_CLOCK_SKEW_MS: u128 = 60_000;

// TPM 2.0 structure constants.
pub(crate) const TPM_GENERATED_VALUE: u32 = 0xff54_4347;
pub(crate) const TPM_ST_ATTEST_CERTIFY: u16 = 0x8017;
pub(crate) const TPM_ALG_RSA: u16 = 0x0001;
pub(crate) const TPM_ALG_SHA1: u16 = 0x0004;
pub(crate) const TPM_ALG_SHA256: u16 = 0x000b;
pub(crate) const TPM_ALG_SHA384: u16 = 0x000c;
pub(crate) const TPM_ALG_SHA512: u16 = 0x000d;
pub(crate) const TPM_ALG_NULL: u16 = 0x0010;
pub(crate) const TPM_ALG_ECC: u16 = 0x0023;
pub(crate) const TPM_ECC_NIST_P256: u16 = 0x0003;
pub(crate) const TPM_ECC_NIST_P384: u16 = 0x0004;
pub(crate) const TPM_ECC_NIST_P521: u16 = 0x0005;
