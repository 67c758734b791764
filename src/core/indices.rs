use hashbrown::HashMap;

use crate::types::TransactionId;

pub type VecIndex<K> = HashMap<K, Vec<TransactionId>>;
