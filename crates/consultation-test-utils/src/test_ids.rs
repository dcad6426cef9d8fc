//! Fixed test ids for deterministic tests.

// Signing secret shared by the harness config and the token builder.
pub const TEST_JWT_SECRET: &str = "consultation-test-secret-0123456789abcdef";

// Users (40-49)
pub const TEST_USER_ID: i64 = 42;
pub const TEST_OTHER_USER_ID: i64 = 43;

// Doctors (7-9)
pub const TEST_DOCTOR_ID: i64 = 7;
pub const TEST_DOCTOR_NAME: &str = "Dr. Amara Okafor";
pub const TEST_UNVERIFIED_DOCTOR_ID: i64 = 8;

// Catalog products (55-59)
pub const TEST_PRODUCT_AMOXICILLIN: i64 = 55;
pub const TEST_PRODUCT_PARACETAMOL: i64 = 56;

// Pharmacies (300-399)
pub const TEST_PHARMACY_ID: i64 = 300;
pub const TEST_EMPTY_PHARMACY_ID: i64 = 301;

// Blob store
pub const TEST_BLOB_BASE_URL: &str = "https://blobs.test";
