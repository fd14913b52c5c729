//! Deck generation and the per-layer shuffle step

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::PokerResult;
use crate::protocol::Blob;
use crate::security::SymmetricKey;

/// A random permutation of `0..deck_size`
pub fn generate_plaintext<R: Rng + ?Sized>(deck_size: usize, rng: &mut R) -> Vec<u64> {
    let mut deck: Vec<u64> = (0..deck_size as u64).collect();
    deck.shuffle(rng);
    deck
}

/// The innermost layer: every card value under the Caller's key
pub fn encrypt_plaintext(deck: &[u64], key: &SymmetricKey) -> PokerResult<Vec<Blob>> {
    deck.iter()
        .map(|number| key.encrypt_number(*number).map(Blob::new))
        .collect()
}

/// One shuffle layer: encrypt every element under `key`, then permute
pub fn reencrypt_and_shuffle<R: Rng + ?Sized>(deck: &[Blob], key: &SymmetricKey, rng: &mut R) -> PokerResult<Vec<Blob>> {
    let mut layer = encrypt_layer(deck, key)?;
    layer.shuffle(rng);
    Ok(layer)
}

/// Encrypt every element under `key`, keeping the order
pub fn encrypt_layer(deck: &[Blob], key: &SymmetricKey) -> PokerResult<Vec<Blob>> {
    deck.iter()
        .map(|blob| key.encrypt(blob.as_bytes()).map(Blob::new))
        .collect()
}

/// Whether two sequences hold the same elements with the same multiplicities
pub fn same_multiset<T: Ord + Clone>(left: &[T], right: &[T]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut left = left.to_vec();
    let mut right = right.to_vec();
    left.sort();
    right.sort();
    left == right
}

/// Whether `deck` is a permutation of `0..deck_size`
pub fn is_permutation_of_range(deck: &[u64], deck_size: usize) -> bool {
    let expected: Vec<u64> = (0..deck_size as u64).collect();
    same_multiset(deck, &expected)
}
