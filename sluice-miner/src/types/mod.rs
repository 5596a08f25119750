pub mod hashrate;

pub use hashrate::HashRate;
