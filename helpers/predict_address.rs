//! # Safe Address Prediction
//!
//! Prints the address a CREATE2 Safe will be deployed to by
//! `createProxyWithNonce`, without touching the network.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example predict_address -- \
//!   --owners 0x70997970C51812dc3A010C7d01b50e0d17dc79C8,0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC \
//!   --threshold 2 \
//!   --salt-nonce 17051863 \
//!   --master-copy 0x34CfAC646f301356fAa8B21e94227e3583Fe3F5F \
//!   --proxy-factory 0x76E2cFc1F5Fa8F6a5b3fC4c8F4788F0116861F9B \
//!   --proxy-creation-code 0x608060405234801561001057600080fd5b50...
//! ```
//!
//! The payment fields must match the ones stored for the Safe: they are part
//! of the initializer and so of the address.

use alloy::primitives::{Address, Bytes, U256};
use clap::Parser;
use color_eyre::eyre::Result;
use safe_relay_service::domain::safe::{build_setup_data, predict_safe_address, SetupParams};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Comma separated owner addresses
    #[arg(long, value_delimiter = ',', required = true)]
    owners: Vec<Address>,

    #[arg(long)]
    threshold: u64,

    #[arg(long)]
    salt_nonce: U256,

    #[arg(long)]
    master_copy: Address,

    #[arg(long)]
    proxy_factory: Address,

    /// Creation code served by the factory's `proxyCreationCode()`
    #[arg(long)]
    proxy_creation_code: Bytes,

    #[arg(long, default_value = "0x0000000000000000000000000000000000000000")]
    fallback_handler: Address,

    #[arg(long, default_value = "0x0000000000000000000000000000000000000000")]
    payment_token: Address,

    /// Payment in wei or token units
    #[arg(long, default_value = "0")]
    payment: U256,

    #[arg(long, default_value = "0x0000000000000000000000000000000000000000")]
    payment_receiver: Address,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let setup_data = build_setup_data(&SetupParams {
        owners: args.owners,
        threshold: args.threshold,
        fallback_handler: args.fallback_handler,
        payment_token: args.payment_token,
        payment: args.payment,
        payment_receiver: args.payment_receiver,
        ..Default::default()
    });
    let safe = predict_safe_address(
        args.proxy_factory,
        args.master_copy,
        &args.proxy_creation_code,
        &setup_data,
        args.salt_nonce,
    );

    println!("Setup data: {setup_data}");
    println!("Safe:       {safe}");
    Ok(())
}
