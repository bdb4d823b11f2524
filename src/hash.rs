//! Keyed edge hasher.
//!
//! The solver's graph is defined by a keyed pseudorandom function: the
//! caller-supplied header bytes are digested with BLAKE2b-256 and the four
//! little-endian words of the digest key a SipHash-2-4 instance. Endpoint
//! `side` of edge `e` is then `siphash24(2e + side)` masked to the node-slot
//! width. Both primitives are fixed and publicly specified so independent
//! implementations agree on the graph bit-for-bit.
//!
//! The hash of a single 8-byte input is specialized here (one message word,
//! no length block), matching the proof-of-work's published definition
//! rather than the general byte-stream SipHash.

// ============================================================================
// BLAKE2b
// ============================================================================

const BLAKE2B_IV: [u64; 8] = [
    0x6a09_e667_f3bc_c908,
    0xbb67_ae85_84ca_a73b,
    0x3c6e_f372_fe94_f82b,
    0xa54f_f53a_5f1d_36f1,
    0x510e_527f_ade6_82d1,
    0x9b05_688c_2b3e_6c1f,
    0x1f83_d9ab_fb41_bd6b,
    0x5be0_cd19_137e_2179,
];

const BLAKE2B_SIGMA: [[usize; 16]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
    [14, 10, 4, 8, 9, 15, 13, 6, 1, 12, 0, 2, 11, 7, 5, 3],
    [11, 8, 12, 0, 5, 2, 15, 13, 10, 14, 3, 6, 7, 1, 9, 4],
    [7, 9, 3, 1, 13, 12, 11, 14, 2, 6, 5, 10, 4, 0, 15, 8],
    [9, 0, 5, 7, 2, 4, 10, 15, 14, 1, 11, 12, 6, 8, 3, 13],
    [2, 12, 6, 10, 0, 11, 8, 3, 4, 13, 7, 5, 15, 14, 1, 9],
    [12, 5, 1, 15, 14, 13, 4, 10, 0, 7, 6, 3, 9, 2, 8, 11],
    [13, 11, 7, 14, 12, 1, 3, 9, 5, 0, 15, 4, 8, 6, 2, 10],
    [6, 15, 14, 9, 11, 3, 0, 8, 12, 2, 13, 7, 1, 4, 10, 5],
    [10, 2, 8, 4, 7, 6, 1, 5, 15, 11, 9, 14, 3, 12, 13, 0],
];

#[inline(always)]
fn mix(v: &mut [u64; 16], a: usize, b: usize, c: usize, d: usize, x: u64, y: u64) {
    v[a] = v[a].wrapping_add(v[b]).wrapping_add(x);
    v[d] = (v[d] ^ v[a]).rotate_right(32);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(24);
    v[a] = v[a].wrapping_add(v[b]).wrapping_add(y);
    v[d] = (v[d] ^ v[a]).rotate_right(16);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(63);
}

/// Reads up to eight bytes as a little-endian word.
#[inline(always)]
fn le_u64(bytes: &[u8]) -> u64 {
    let mut w = 0u64;
    for (i, &b) in bytes.iter().enumerate() {
        w |= u64::from(b) << (8 * i);
    }
    w
}

fn blake2b_compress(h: &mut [u64; 8], block: &[u8; 128], bytes_so_far: u64, last: bool) {
    let mut m = [0u64; 16];
    for (i, word) in m.iter_mut().enumerate() {
        *word = le_u64(&block[i * 8..i * 8 + 8]);
    }

    let mut v = [0u64; 16];
    v[..8].copy_from_slice(h);
    v[8..].copy_from_slice(&BLAKE2B_IV);
    v[12] ^= bytes_so_far;
    if last {
        v[14] = !v[14];
    }

    for round in 0..12 {
        let s = &BLAKE2B_SIGMA[round % 10];
        mix(&mut v, 0, 4, 8, 12, m[s[0]], m[s[1]]);
        mix(&mut v, 1, 5, 9, 13, m[s[2]], m[s[3]]);
        mix(&mut v, 2, 6, 10, 14, m[s[4]], m[s[5]]);
        mix(&mut v, 3, 7, 11, 15, m[s[6]], m[s[7]]);
        mix(&mut v, 0, 5, 10, 15, m[s[8]], m[s[9]]);
        mix(&mut v, 1, 6, 11, 12, m[s[10]], m[s[11]]);
        mix(&mut v, 2, 7, 8, 13, m[s[12]], m[s[13]]);
        mix(&mut v, 3, 4, 9, 14, m[s[14]], m[s[15]]);
    }

    for i in 0..8 {
        h[i] ^= v[i] ^ v[i + 8];
    }
}

/// Unkeyed BLAKE2b digest of `data`; the first `out_len` bytes of the
/// returned buffer are the digest.
pub fn blake2b(data: &[u8], out_len: usize) -> [u8; 64] {
    debug_assert!((1..=64).contains(&out_len));
    let mut h = BLAKE2B_IV;
    h[0] ^= 0x0101_0000 ^ out_len as u64;

    let mut block = [0u8; 128];
    if data.is_empty() {
        blake2b_compress(&mut h, &block, 0, true);
    } else {
        let mut offset = 0usize;
        while offset < data.len() {
            let take = (data.len() - offset).min(128);
            block = [0u8; 128];
            block[..take].copy_from_slice(&data[offset..offset + take]);
            offset += take;
            blake2b_compress(&mut h, &block, offset as u64, offset == data.len());
        }
    }

    let mut out = [0u8; 64];
    for (i, w) in h.iter().enumerate() {
        out[i * 8..i * 8 + 8].copy_from_slice(&w.to_le_bytes());
    }
    out
}

// ============================================================================
// SipHash-2-4 keys
// ============================================================================

/// The four-word SipHash key derived from a header digest.
///
/// Immutable for the lifetime of a solve attempt; all worker threads read it
/// without synchronization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SipKeys {
    k0: u64,
    k1: u64,
    k2: u64,
    k3: u64,
}

#[inline(always)]
fn sip_round(v: &mut [u64; 4]) {
    v[0] = v[0].wrapping_add(v[1]);
    v[2] = v[2].wrapping_add(v[3]);
    v[1] = v[1].rotate_left(13);
    v[3] = v[3].rotate_left(16);
    v[1] ^= v[0];
    v[3] ^= v[2];
    v[0] = v[0].rotate_left(32);
    v[2] = v[2].wrapping_add(v[1]);
    v[0] = v[0].wrapping_add(v[3]);
    v[1] = v[1].rotate_left(17);
    v[3] = v[3].rotate_left(21);
    v[1] ^= v[2];
    v[3] ^= v[0];
    v[2] = v[2].rotate_left(32);
}

impl SipKeys {
    /// Derives the key quadruple from header bytes: the four little-endian
    /// words of BLAKE2b-256(header).
    pub fn from_header(header: &[u8]) -> Self {
        let digest = blake2b(header, 32);
        Self {
            k0: le_u64(&digest[0..8]),
            k1: le_u64(&digest[8..16]),
            k2: le_u64(&digest[16..24]),
            k3: le_u64(&digest[24..32]),
        }
    }

    /// SipHash-2-4 of a single 8-byte input word.
    #[inline]
    pub fn siphash24(&self, input: u64) -> u64 {
        let mut v = [self.k0, self.k1, self.k2, self.k3 ^ input];
        sip_round(&mut v);
        sip_round(&mut v);
        v[0] ^= input;
        v[2] ^= 0xff;
        for _ in 0..4 {
            sip_round(&mut v);
        }
        v[0] ^ v[1] ^ v[2] ^ v[3]
    }

    /// Hashes a batch of inputs into `out`. One call per batch keeps the
    /// trimming loop's inner scan free of per-edge call overhead and gives
    /// the optimizer a straight-line body to vectorize.
    #[inline]
    pub fn hash_batch(&self, inputs: &[u64], out: &mut [u64]) {
        debug_assert_eq!(inputs.len(), out.len());
        for (o, &i) in out.iter_mut().zip(inputs.iter()) {
            *o = self.siphash24(i);
        }
    }
}

/// Endpoint slot of edge `edge` on side `side` (0 or 1), masked to the
/// node-slot width.
#[inline(always)]
pub fn sipnode(keys: &SipKeys, edge: u64, side: u64, edge_mask: u64) -> u64 {
    debug_assert!(side < 2);
    keys.siphash24(2 * edge + side) & edge_mask
}

// ============================================================================
// Tests
// ============================================================================
