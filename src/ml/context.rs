// Everything a run shares between components: the device, the
// sequence encoder (tokenizer + special ids + truncation lengths)
// and the generation length. Passed explicitly; nothing global.

use burn::prelude::*;

use crate::data::encoder::SequenceEncoder;

pub struct RunContext<B: Backend> {
    device: B::Device,
    encoder: SequenceEncoder,
    max_gen_len: usize,
}

impl<B: Backend> RunContext<B> {
    pub fn new(device: B::Device, encoder: SequenceEncoder, max_gen_len: usize) -> Self {
        Self {
            device,
            encoder,
            max_gen_len: max_gen_len.max(1),
        }
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn encoder(&self) -> &SequenceEncoder {
        &self.encoder
    }

    pub fn max_gen_len(&self) -> usize {
        self.max_gen_len
    }
}
