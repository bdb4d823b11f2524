use cuckatoo::config::SolverConfig;
use cuckatoo::hash::SipKeys;
use cuckatoo::scan::{scan_range, ScanOptions};
use cuckatoo::verify::verify_proof;

const HEADER_LEN: usize = 80;

fn main() {
    let mut cfg = SolverConfig::new(19);
    cfg.verbose = false;
    let mut header_text = String::new();
    let mut nonce: Option<u32> = None;
    let mut random_start = false;
    let mut range: u32 = 1;
    let mut trims: Option<usize> = None;
    let mut opts = ScanOptions::default();

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bits" => {
                let v = args.get(i + 1).unwrap_or_else(|| usage_and_exit(2));
                cfg.edge_bits = v.parse().unwrap_or_else(|_| usage_and_exit(2));
                i += 2;
            }
            "--header" | "-h" => {
                header_text = args
                    .get(i + 1)
                    .unwrap_or_else(|| usage_and_exit(2))
                    .clone();
                i += 2;
            }
            "--nonce" | "-n" => {
                let v = args.get(i + 1).unwrap_or_else(|| usage_and_exit(2));
                nonce = Some(v.parse().unwrap_or_else(|_| usage_and_exit(2)));
                i += 2;
            }
            "--random" => {
                random_start = true;
                i += 1;
            }
            "--range" | "-r" => {
                let v = args.get(i + 1).unwrap_or_else(|| usage_and_exit(2));
                range = v.parse().unwrap_or_else(|_| usage_and_exit(2));
                i += 2;
            }
            "--trims" | "-m" => {
                let v = args.get(i + 1).unwrap_or_else(|| usage_and_exit(2));
                trims = Some(v.parse().unwrap_or_else(|_| usage_and_exit(2)));
                i += 2;
            }
            "--threads" | "-t" => {
                let v = args.get(i + 1).unwrap_or_else(|| usage_and_exit(2));
                cfg.nthreads = v.parse().unwrap_or_else(|_| usage_and_exit(2));
                i += 2;
            }
            "--chains" => {
                let v = args.get(i + 1).unwrap_or_else(|| usage_and_exit(2));
                opts.chains = v.parse().unwrap_or_else(|_| usage_and_exit(2));
                i += 2;
            }
            "--proof-size" => {
                let v = args.get(i + 1).unwrap_or_else(|| usage_and_exit(2));
                cfg.proof_size = v.parse().unwrap_or_else(|_| usage_and_exit(2));
                i += 2;
            }
            "--first" => {
                opts.stop_on_first = true;
                i += 1;
            }
            "--verbose" | "-v" => {
                cfg.verbose = true;
                i += 1;
            }
            "--help" => usage_and_exit(0),
            _ => usage_and_exit(2),
        }
    }

    cfg.ntrims = trims.unwrap_or(2 * cfg.edge_bits as usize);

    let start = nonce.unwrap_or_else(|| if random_start { rand::random::<u32>() } else { 0 });

    let mut header = [0u8; HEADER_LEN];
    let text = header_text.as_bytes();
    let copy = text.len().min(HEADER_LEN - 4);
    header[..copy].copy_from_slice(&text[..copy]);

    println!(
        "Looking for {}-cycle on cuckatoo{}(\"{}\", {}..{}) with {} trims, {} threads, {} chains",
        cfg.proof_size,
        cfg.edge_bits,
        header_text,
        start,
        u64::from(start) + u64::from(range),
        cfg.ntrims,
        cfg.nthreads,
        opts.chains.max(1),
    );

    let solutions = match scan_range(&cfg, &header, start, range, &opts) {
        Ok(solutions) => solutions,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    if solutions.is_empty() {
        println!("No solutions in {range} nonce(s).");
        return;
    }

    let mut all_ok = true;
    for sol in &solutions {
        let mut keyed = header;
        keyed[HEADER_LEN - 4..].copy_from_slice(&sol.nonce.to_le_bytes());
        let keys = SipKeys::from_header(&keyed);

        print!("Solution at nonce {}:", sol.nonce);
        for edge in &sol.proof {
            print!(" {edge:x}");
        }
        println!();
        match verify_proof(&sol.proof, &keys, &cfg) {
            Ok(()) => println!("Verified OK"),
            Err(e) => {
                eprintln!("Verification FAILED: {e}");
                all_ok = false;
            }
        }
    }
    if !all_ok {
        std::process::exit(1);
    }
}

fn usage_and_exit(code: i32) -> ! {
    eprintln!(
        "Usage:\n  lean [--bits N] [--header S] [--nonce N | --random] [--range N]\n       [--trims N] [--threads N] [--chains N] [--proof-size N] [--first] [--verbose]\n\nOptions:\n  --bits N         log2 of the edge count (default: 19)\n  --header S       header text, keyed into the graph (default: empty)\n  --nonce N        starting header nonce (default: 0)\n  --random         start from a random nonce instead\n  --range N        number of nonces to scan (default: 1)\n  --trims N        trimming rounds per attempt (default: 2*bits)\n  --threads N      worker threads per attempt (default: 1)\n  --chains N       parallel scan chains (default: 1)\n  --proof-size N   target cycle length, even (default: 42)\n  --first          stop scanning after the first solution\n  --verbose        print per-round progress\n"
    );
    std::process::exit(code)
}
