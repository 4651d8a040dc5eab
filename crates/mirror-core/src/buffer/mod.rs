//! Latest-wins frame storage shared between capture and delivery.

pub mod frame_buffer;
