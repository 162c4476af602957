use rand::{thread_rng, RngCore};

pub const PEER_ID_LEN: usize = 20;

/// A fresh peer id: the `rT` client tag followed by random bytes.
pub fn gen_peer_id() -> [u8; PEER_ID_LEN] {
    let mut peer_id = [0u8; PEER_ID_LEN];
    peer_id[0] = b'r';
    peer_id[1] = b'T';
    thread_rng().fill_bytes(&mut peer_id[2..]);
    peer_id
}
