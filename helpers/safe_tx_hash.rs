//! # Safe Transaction Hash
//!
//! Computes the EIP-712 hash owners sign for a Safe transaction, the same
//! hash the relay checks signatures against.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example safe_tx_hash -- \
//!   --safe 0x5FbDB2315678afecb367f032d93F642f64180aa3 \
//!   --to 0x70997970C51812dc3A010C7d01b50e0d17dc79C8 \
//!   --value 1000000000000000 \
//!   --nonce 0 \
//!   --safe-version 1.3.0 \
//!   --chain-id 1
//! ```

use alloy::primitives::{Address, Bytes, U256};
use clap::Parser;
use color_eyre::eyre::{eyre, Result};
use safe_relay_service::{
    domain::safe::{compute_safe_tx_hash, domain_separator, SafeTx},
    models::{SafeOperation, SafeVersion},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Safe the transaction is executed by
    #[arg(long)]
    safe: Address,

    #[arg(long)]
    to: Address,

    /// Value in wei
    #[arg(long, default_value = "0")]
    value: U256,

    /// Call data as hex, with or without 0x prefix
    #[arg(long, default_value = "0x")]
    data: Bytes,

    /// 0 call, 1 delegate call, 2 create
    #[arg(long, default_value_t = 0)]
    operation: u8,

    #[arg(long, default_value = "0")]
    safe_tx_gas: U256,

    /// Named `dataGas` before Safe 1.0.0
    #[arg(long, default_value = "0")]
    base_gas: U256,

    #[arg(long, default_value = "0")]
    gas_price: U256,

    #[arg(long, default_value = "0x0000000000000000000000000000000000000000")]
    gas_token: Address,

    #[arg(long, default_value = "0x0000000000000000000000000000000000000000")]
    refund_receiver: Address,

    #[arg(long)]
    nonce: U256,

    #[arg(long, default_value = "1.1.1")]
    safe_version: String,

    /// Only part of the domain from Safe 1.3.0 on
    #[arg(long, default_value_t = 1)]
    chain_id: u64,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let version: SafeVersion = args.safe_version.parse().map_err(|e: String| eyre!(e))?;
    let operation = SafeOperation::try_from(args.operation).map_err(|e| eyre!(e))?;
    let tx = SafeTx {
        to: args.to,
        value: args.value,
        data: args.data,
        operation,
        safe_tx_gas: args.safe_tx_gas,
        base_gas: args.base_gas,
        gas_price: args.gas_price,
        gas_token: args.gas_token,
        refund_receiver: args.refund_receiver,
        nonce: args.nonce,
    };

    println!("Safe version:     {version}");
    println!(
        "Domain separator: {}",
        domain_separator(args.safe, version, args.chain_id)
    );
    println!(
        "Safe tx hash:     {}",
        compute_safe_tx_hash(args.safe, &tx, version, args.chain_id)
    );
    Ok(())
}
