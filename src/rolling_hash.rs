/// Adler-32 style checksum over a sliding window.
///
/// Two sums modulo `MOD_ADLER`: `a` is 1 + the byte sum, `b` the sum of the
/// running `a` values. Sliding the window by one byte is O(1).
const MOD_ADLER: u32 = 65521;

#[derive(Debug, Clone, Copy)]
pub struct RollingHash {
    a: u32,
    b: u32,
    window: u32,
}

impl RollingHash {
    /// Checksum of `window`.
    pub fn over(window: &[u8]) -> Self {
        // u64 accumulators postpone the modulo to the end
        let (a, b) = window.iter().fold((1u64, 0u64), |(a, b), &byte| {
            let a = a + byte as u64;
            (a, b + a)
        });
        Self {
            a: (a % MOD_ADLER as u64) as u32,
            b: (b % MOD_ADLER as u64) as u32,
            window: window.len() as u32,
        }
    }

    /// Drop `leaving` from the front of the window and append `entering`.
    pub fn roll(&mut self, leaving: u8, entering: u8) {
        let leaving = leaving as u32;
        let entering = entering as u32;
        self.a = (self.a + MOD_ADLER - leaving + entering) % MOD_ADLER;
        self.b = (self.b + MOD_ADLER - 1 + self.a
            - (leaving * self.window) % MOD_ADLER)
            % MOD_ADLER;
    }

    pub fn value(&self) -> u32 {
        (self.b << 16) | self.a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_adler32() {
        // Adler-32 of "Wikipedia" is 0x11E60398
        assert_eq!(RollingHash::over(b"Wikipedia").value(), 0x11E6_0398);
    }

    #[test]
    fn test_roll_across_buffer() {
        let data: Vec<u8> = (0..200u32).map(|i| (i * 37 % 251) as u8).collect();
        let width = 16;
        let mut rolling = RollingHash::over(&data[..width]);
        for start in 1..=data.len() - width {
            rolling.roll(data[start - 1], data[start + width - 1]);
            assert_eq!(
                rolling.value(),
                RollingHash::over(&data[start..start + width]).value(),
                "window at {start}"
            );
        }
    }

    #[test]
    fn test_roll_with_extreme_bytes() {
        let data = [0xFFu8, 0x00, 0xFF, 0xFF, 0x00, 0xFF];
        let mut rolling = RollingHash::over(&data[..3]);
        rolling.roll(data[0], data[3]);
        assert_eq!(rolling.value(), RollingHash::over(&data[1..4]).value());
    }
}
