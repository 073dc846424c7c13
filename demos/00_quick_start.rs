/// quick start - request, fund and repay a single loan
use chrono::Duration;
use nft_lending_rs::external::{MemoryAllowList, MemoryNftLedger, MemoryTokenBank, MockOracle};
use nft_lending_rs::{
    Address, Amount, Bps, LoanRegistry, NftId, SafeTimeProvider, TimeSource, Valuation,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let time = SafeTimeProvider::new(TimeSource::System);
    let now = time.now();

    // in-memory collaborators standing in for the external contracts
    let bank = MemoryTokenBank::new();
    let usd = Address::from("usd");
    bank.register_token(usd.clone(), 6);
    bank.mint(&usd, &Address::from("lender"), Amount::from_whole(50_000, 6));
    bank.mint(&usd, &Address::from("borrower"), Amount::from_whole(5_000, 6));

    let nfts = MemoryNftLedger::new();
    nfts.register_collection(Address::from("apes"));
    let collateral = NftId::new(Address::from("apes"), 1);
    nfts.mint(collateral.clone(), Address::from("borrower"));

    let oracle = MockOracle::new();
    oracle.set_valuation(
        collateral.clone(),
        Valuation {
            timestamp: now,
            price: 30_000,
            ltv: 50,
        },
    );

    let allow_list = MemoryAllowList::new();
    allow_list.allow(Address::from("borrower"));
    allow_list.allow(Address::from("lender"));

    let mut registry = LoanRegistry::new(
        Address::from("registry"),
        Address::from("admin"),
        Address::from("treasury"),
        Box::new(bank.clone()),
        Box::new(nfts.clone()),
        Box::new(oracle),
        Box::new(allow_list),
    );

    // a 30-day product at 9% apr
    let duration = 30 * 86_400;
    registry.allow_token(&Address::from("admin"), usd.clone(), &time)?;
    registry.set_apr_for_duration(&Address::from("admin"), duration, Bps::new(900), &time)?;

    // borrow 10,000 usd against the nft
    let id = registry.request_loan(
        &Address::from("borrower"),
        usd.clone(),
        Amount::from_whole(10_000, 6),
        collateral,
        duration,
        now + Duration::days(1),
        &time,
    )?;
    registry.accept_loan(&Address::from("lender"), id, &time)?;
    registry.repay_loan(&Address::from("borrower"), id, &time)?;

    println!("lender balance: {}", bank.balance(&usd, &Address::from("lender")));
    println!("treasury balance: {}", bank.balance(&usd, &Address::from("treasury")));

    Ok(())
}
