pub mod x402;

pub use x402::{x402_middleware_layer, Admission, PaymentGate, PaymentRejection, X402Settings};
