pub mod model;
pub mod utxo;

pub use model::{Transaction, TxInput, TxOutput, TxType};
pub use utxo::{OutPoint, UtxoSet};
