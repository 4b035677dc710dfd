mod create2_flow;
mod relay_flow;
