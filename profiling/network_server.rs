/// Network Server Profiling Program
///
/// Simulates a multi-threaded server where every request and response goes
/// through the process-wide pool. This workload demonstrates:
/// - Contention of many callers on the single pool worker
/// - Rendezvous backpressure when the worker falls behind
/// - Reuse rate once the pool has warmed up
///
/// Usage: cargo flamegraph --profile profiling --bin network_server
use std::thread;
use std::time::Instant;

// Configuration
const NUM_WORKER_THREADS: usize = 8;
const CONNECTIONS_PER_THREAD: usize = 2000;
const REQUESTS_PER_CONNECTION: usize = 100;
const BLOCK_SIZE: usize = 16 * 1024;

fn main() {
    eprintln!("=== Network Server Profiling ===");
    eprintln!("Worker threads: {}", NUM_WORKER_THREADS);
    eprintln!("Connections per thread: {}", CONNECTIONS_PER_THREAD);
    eprintln!("Requests per connection: {}", REQUESTS_PER_CONNECTION);
    eprintln!("Block size: {} bytes", BLOCK_SIZE);
    eprintln!();

    let pool = tidepool::global_with_block_size(BLOCK_SIZE);

    let start = Instant::now();
    let mut handles = Vec::new();

    eprintln!("Starting {} worker threads...", NUM_WORKER_THREADS);

    for worker_id in 0..NUM_WORKER_THREADS {
        handles.push(thread::spawn(move || worker_thread(worker_id)));
    }

    let mut total_requests = 0;
    let mut total_bytes = 0;

    for handle in handles {
        let (requests, bytes) = handle.join().unwrap();
        total_requests += requests;
        total_bytes += bytes;
    }

    let duration = start.elapsed();
    let stats = pool.stats();

    eprintln!("\n=== Profiling Complete ===");
    eprintln!("Duration: {:.2?}", duration);
    eprintln!("Total requests: {}", total_requests);
    eprintln!("Total data processed: {:.2} GB", total_bytes as f64 / 1e9);
    eprintln!("Throughput: {:.0} req/s", total_requests as f64 / duration.as_secs_f64());
    eprintln!("Buffers allocated: {}", stats.allocated);
    eprintln!("Reuse rate: {:.2}%", stats.reuse_rate() * 100.0);
}

/// Worker thread handling connections
fn worker_thread(worker_id: usize) -> (usize, usize) {
    let pool = tidepool::global();
    let mut requests_processed = 0;
    let mut bytes_processed = 0;

    if worker_id == 0 {
        eprintln!("  Worker {} started", worker_id);
    }

    for _ in 0..CONNECTIONS_PER_THREAD {
        let (reqs, bytes) = handle_connection(pool);
        requests_processed += reqs;
        bytes_processed += bytes;
    }

    (requests_processed, bytes_processed)
}

/// Handle a single connection with multiple requests
fn handle_connection(pool: &tidepool::BufferPool) -> (usize, usize) {
    let mut requests = 0;
    let mut bytes = 0;

    for _ in 0..REQUESTS_PER_CONNECTION {
        let mut request_buf = pool.get();
        receive_packet(&mut request_buf);
        let request_id = parse_request(&request_buf);
        bytes += request_buf.len();

        let mut response_buf = pool.get();
        generate_response(&mut response_buf, request_id);
        send_packet(&response_buf);
        bytes += response_buf.len();

        requests += 1;

        // Buffers returned to the pool when dropped
    }

    (requests, bytes)
}

/// Simulate receiving a network packet
fn receive_packet(buffer: &mut [u8]) {
    if !buffer.is_empty() {
        buffer[0] = 1;
    }
}

/// Simulate parsing a request header
fn parse_request(buffer: &[u8]) -> u32 {
    std::hint::black_box(buffer.len() as u32)
}

/// Simulate generating response data
fn generate_response(buffer: &mut [u8], request_id: u32) {
    if !buffer.is_empty() {
        buffer[0] = (request_id % 256) as u8;
    }
}

/// Simulate sending packet to network
fn send_packet(buffer: &[u8]) {
    std::hint::black_box(buffer.len());
}
