mod common;
mod data;
mod edge;
mod finished;
mod fragmentation;
mod handshake;
mod reorder;
mod retransmit;
