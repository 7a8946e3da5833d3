/// Accumulates raw SSE bytes and hands out complete event blocks.
///
/// Bytes are kept undecoded until a block boundary is seen, so multi-byte
/// characters split across network chunks survive intact.
#[derive(Debug, Default)]
pub struct SseBuffer {
    buffer: Vec<u8>,
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

impl SseBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    pub fn next_event_block(&mut self) -> Option<String> {
        let lf = find_subslice(&self.buffer, b"\n\n").map(|at| (at, 2));
        let crlf = find_subslice(&self.buffer, b"\r\n\r\n").map(|at| (at, 4));
        let (boundary, width) = lf.into_iter().chain(crlf).min_by_key(|(at, _)| *at)?;

        let remaining = self.buffer.split_off(boundary + width);
        let block = std::mem::replace(&mut self.buffer, remaining);
        Some(String::from_utf8_lossy(&block).replace("\r\n", "\n"))
    }
}

pub fn parse_data_lines(event_block: &str) -> Vec<&str> {
    event_block
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .collect()
}
