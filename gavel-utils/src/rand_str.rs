use rand::distributions::Alphanumeric;
use rand::Rng;

/// Random alphanumeric string of length `n`, used for workdir names.
pub fn rand_alnum(n: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(n)
        .map(char::from)
        .collect()
}
