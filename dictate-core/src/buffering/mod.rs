//! Buffering primitives between the real-time capture callback and the
//! async capture service.

pub mod chunk;
pub mod chunk_queue;

pub use chunk::AudioChunk;
pub use chunk_queue::{ChunkQueue, ChunkSink, ChunkSource};

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Producer};

/// Type alias for the producer half — held by the audio callback thread.
pub type AudioProducer = ringbuf::HeapProd<f32>;

/// Type alias for the consumer half — held by the pipeline thread.
pub type AudioConsumer = ringbuf::HeapCons<f32>;

/// Per-callback scratch ring: large enough to smooth over scheduling jitter
/// between the OS audio callback and the thread that drains it into chunks.
/// 2^16 = 65 536 f32 samples ≈ 4 s at 16 kHz.
pub const RING_CAPACITY: usize = 1 << 16;

/// Create a matched producer/consumer pair backed by a heap-allocated ring buffer.
pub fn create_sample_ring() -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}
