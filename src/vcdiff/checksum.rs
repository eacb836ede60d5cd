// Per-window checksum.
//
// Any `fn(&[u8]) -> u32` can be plugged in; encoder and decoder must agree.
// The default is Adler-32, SIMD-accelerated when the `adler32` feature is on.

/// Checksum over one window's produced bytes.
pub type ChecksumFn = fn(&[u8]) -> u32;

/// Adler-32 of `data`.
pub fn adler32(data: &[u8]) -> u32 {
    #[cfg(feature = "adler32")]
    {
        let mut hasher = simd_adler32::Adler32::new();
        hasher.write(data);
        hasher.finish()
    }
    #[cfg(not(feature = "adler32"))]
    {
        adler32_scalar(data)
    }
}

/// The checksum used when none is configured.
pub const DEFAULT_CHECKSUM: ChecksumFn = adler32;

#[cfg_attr(feature = "adler32", allow(dead_code))]
fn adler32_scalar(data: &[u8]) -> u32 {
    const MOD_ADLER: u32 = 65_521;
    // Largest n such that 255 * n * (n + 1) / 2 + (n + 1) * (MOD_ADLER - 1) fits in u32.
    const NMAX: usize = 5_552;

    let mut a: u32 = 1;
    let mut b: u32 = 0;
    for chunk in data.chunks(NMAX) {
        for &byte in chunk {
            a += u32::from(byte);
            b += a;
        }
        a %= MOD_ADLER;
        b %= MOD_ADLER;
    }
    (b << 16) | a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors() {
        assert_eq!(adler32(b""), 1);
        assert_eq!(adler32(b"Wikipedia"), 0x11E6_0398);
        assert_eq!(adler32_scalar(b"Wikipedia"), 0x11E6_0398);
    }

    #[test]
    fn scalar_matches_default_on_long_input() {
        let data: Vec<u8> = (0..100_000u32).map(|i| (i * 31 % 251) as u8).collect();
        assert_eq!(adler32_scalar(&data), adler32(&data));
    }

    #[test]
    fn single_byte_change_is_detected() {
        let mut data = vec![7u8; 4096];
        let before = adler32(&data);
        data[2048] ^= 1;
        assert_ne!(before, adler32(&data));
    }
}
