//! APR1-MD5 password hashing for basic auth files.
//!
//! APR1-MD5 is the strongest hash NGINX supports for basic auth. The
//! algorithm is the MD5 variant out of Apache's htpasswd program; it is
//! insane, but we have to match it bit for bit.

use md5::{Digest, Md5};
use rand::Rng;

const APR1_ALPHABET: &[u8; 64] =
    b"./0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// An 8 byte long salt drawn from the APR1 alphabet.
pub fn generate_salt() -> String {
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| APR1_ALPHABET[rng.gen_range(0..APR1_ALPHABET.len())] as char)
        .collect()
}

/// Computes the Apache `$apr1$` hash of a password under a salt.
pub fn compute_apr1(password: &str, salt: &str) -> String {
    let pw = password.as_bytes();
    let sa = salt.as_bytes();

    // Start with a hash of password and salt.
    let init_bin = Md5::digest([pw, sa, pw].concat());

    // Begin an initial string with password, magic and salt, then mix in
    // the initial hash and password bytes in the prescribed dance.
    let mut init_text: Vec<u8> = Vec::new();
    init_text.extend_from_slice(pw);
    init_text.extend_from_slice(b"$apr1$");
    init_text.extend_from_slice(sa);

    let mut i = pw.len() as isize;
    while i > 0 {
        let lim = i.min(16) as usize;
        init_text.extend_from_slice(&init_bin[0..lim]);
        i -= 16;
    }

    let mut i = pw.len();
    while i > 0 {
        if i & 1 == 1 {
            init_text.push(0);
        } else {
            init_text.push(pw[0]);
        }
        i >>= 1;
    }

    let mut bin: [u8; 16] = Md5::digest(&init_text).into();

    // 1000 rounds of muddling.
    for i in 0..1000 {
        let mut n: Vec<u8> = Vec::new();

        if i & 1 == 1 {
            n.extend_from_slice(pw);
        } else {
            n.extend_from_slice(&bin);
        }
        if i % 3 != 0 {
            n.extend_from_slice(sa);
        }
        if i % 7 != 0 {
            n.extend_from_slice(pw);
        }
        if i & 1 == 1 {
            n.extend_from_slice(&bin);
        } else {
            n.extend_from_slice(pw);
        }

        bin = Md5::digest(&n).into();
    }

    // Similar-to-base64-but-not-quite encoding: each triple of input bytes
    // pumps out one character per 6 bits. The order of the indices is
    // strange, be careful.
    let mut result = String::new();
    let mut fill = |a: u8, b: u8, c: u8| {
        let mut v = ((a as u32) << 16) + ((b as u32) << 8) + c as u32;
        for _ in 0..4 {
            result.push(APR1_ALPHABET[(v & 0x3f) as usize] as char);
            v >>= 6;
        }
    };

    fill(bin[0], bin[6], bin[12]);
    fill(bin[1], bin[7], bin[13]);
    fill(bin[2], bin[8], bin[14]);
    fill(bin[3], bin[9], bin[15]);
    fill(bin[4], bin[10], bin[5]); // 5? Yes.
    fill(0, 0, bin[11]);

    // Two extra characters were written, only 22 are needed.
    format!("$apr1${}${}", salt, &result[0..22])
}
