/// full lifecycle walkthrough with controlled time: default, exclusive
/// window, third-party liquidation
use chrono::{Duration, TimeZone, Utc};
use nft_lending_rs::external::{MemoryAllowList, MemoryNftLedger, MemoryTokenBank, MockOracle};
use nft_lending_rs::{
    Address, Amount, Bps, LoanRegistry, NftId, RegistryView, SafeTimeProvider, TimeSource,
    Valuation,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let time = SafeTimeProvider::new(TimeSource::Test(t0));
    let control = time.test_control().unwrap();

    let bank = MemoryTokenBank::new();
    let usd = Address::from("usd");
    bank.register_token(usd.clone(), 6);
    bank.mint(&usd, &Address::from("lender"), Amount::from_whole(200_000, 6));
    bank.mint(&usd, &Address::from("keeper"), Amount::from_whole(200_000, 6));

    let nfts = MemoryNftLedger::new();
    nfts.register_collection(Address::from("apes"));
    let collateral = NftId::new(Address::from("apes"), 7);
    nfts.mint(collateral.clone(), Address::from("borrower"));

    let oracle = MockOracle::new();
    oracle.set_valuation(
        collateral.clone(),
        Valuation {
            timestamp: t0,
            price: 250_000,
            ltv: 50,
        },
    );

    let allow_list = MemoryAllowList::new();
    allow_list.allow(Address::from("borrower"));
    allow_list.allow(Address::from("lender"));
    allow_list.allow(Address::from("keeper"));

    let mut registry = LoanRegistry::new(
        Address::from("registry"),
        Address::from("admin"),
        Address::from("treasury"),
        Box::new(bank.clone()),
        Box::new(nfts.clone()),
        Box::new(oracle),
        Box::new(allow_list),
    );

    // 18-month product at 10.7% apr
    let term = 540 * 86_400;
    registry.allow_token(&Address::from("admin"), usd.clone(), &time)?;
    registry.set_apr_for_duration(&Address::from("admin"), term, Bps::new(1_070), &time)?;

    let id = registry.request_loan(
        &Address::from("borrower"),
        usd.clone(),
        Amount::from_whole(100_000, 6),
        collateral.clone(),
        term,
        t0 + Duration::days(3),
        &time,
    )?;
    registry.accept_loan(&Address::from("lender"), id, &time)?;
    println!("loan {} funded, collateral in escrow", id);

    // the borrower defaults: maturity, grace and the lender-exclusive
    // window all pass
    control.advance(Duration::days(540 + 7 + 1) + Duration::seconds(1));

    registry.liquidate_loan(&Address::from("keeper"), id, &time)?;
    println!("liquidated; collateral now held by {}", nfts.owner(&collateral).unwrap());
    println!("lender recovered: {}", bank.balance(&usd, &Address::from("lender")));
    println!("treasury fees: {}", bank.balance(&usd, &Address::from("treasury")));

    println!("{}", RegistryView::from_registry(&registry).to_json_pretty()?);

    for event in registry.take_events() {
        println!("{:?}", event);
    }

    Ok(())
}
