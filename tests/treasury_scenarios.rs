use std::sync::Arc;
use std::thread;

use honey_treasury::ledger::ONE_TOKEN;
use honey_treasury::{Address, Amount, ErrorKind, Ledger, LedgerError, Treasury, TreasuryError};

const HOLDER: Address = Address::from_bytes([0xb4; 20]);
const A: Address = Address::from_bytes([0xa1; 20]);
const B: Address = Address::from_bytes([0xb2; 20]);
const C: Address = Address::from_bytes([0xc3; 20]);

fn deploy(supply: Amount) -> (Arc<Ledger>, Treasury) {
    let ledger = Arc::new(Ledger::create(HOLDER, supply).unwrap());
    let treasury = Treasury::new(ledger.clone(), A, Address::derive_contract(&A, 0)).unwrap();
    (ledger, treasury)
}

fn funded(amount: Amount) -> (Arc<Ledger>, Treasury) {
    let (ledger, treasury) = deploy(1_000 * ONE_TOKEN);
    ledger.transfer(&HOLDER, &treasury.address(), amount).unwrap();
    (ledger, treasury)
}

#[test]
fn treasury_remembers_its_ledger() {
    let (ledger, treasury) = deploy(1);
    assert!(Arc::ptr_eq(treasury.ledger(), &ledger));
}

#[test]
fn holder_funds_the_treasury() {
    let (ledger, treasury) = deploy(1_000);
    assert_eq!(ledger.balance_of(&HOLDER), 1_000);
    assert_eq!(treasury.balance(), 0);

    ledger.transfer(&HOLDER, &treasury.address(), 100).unwrap();
    assert_eq!(ledger.balance_of(&treasury.address()), 100);
    assert_eq!(treasury.balance(), 100);
    assert_eq!(ledger.balance_of(&HOLDER), 900);
}

#[test]
fn owner_can_transfer() {
    let amount = 100 * ONE_TOKEN;
    let (ledger, treasury) = funded(amount);
    assert_eq!(ledger.balance_of(&B), 0);

    treasury.transfer(&A, &B, amount).unwrap();
    assert_eq!(treasury.balance(), 0);
    assert_eq!(ledger.balance_of(&B), amount);
}

#[test]
fn non_owner_cannot_transfer() {
    let amount = 100 * ONE_TOKEN;
    let (ledger, treasury) = funded(amount);
    let before = ledger.snapshot();

    let err = treasury.transfer(&C, &B, amount).unwrap_err();
    assert_eq!(err.to_string(), "Ownable: caller is not the owner");
    assert_eq!(err.kind(), ErrorKind::NotOwner);
    assert_eq!(treasury.balance(), amount);
    assert_eq!(ledger.snapshot(), before);
    assert_eq!(treasury.owner(), A);
}

#[test]
fn no_balance_to_transfer() {
    let (ledger, treasury) = deploy(1_000 * ONE_TOKEN);
    let before = ledger.snapshot();

    let err = treasury.transfer(&A, &B, 100 * ONE_TOKEN).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Honey::_transferTokens: transfer amount exceeds balance"
    );
    assert!(matches!(
        err,
        TreasuryError::Ledger(LedgerError::InsufficientBalance { amount, balance: 0, .. })
            if amount == 100 * ONE_TOKEN
    ));
    assert_eq!(ledger.snapshot(), before);
}

#[test]
fn transfer_owner_successfully() {
    let (_, treasury) = deploy(1);
    assert_ne!(treasury.owner(), B);
    treasury.transfer_ownership(&A, &B).unwrap();
    assert_eq!(treasury.owner(), B);
}

#[test]
fn transfer_owner_unsuccessfully() {
    let (_, treasury) = deploy(1);
    let err = treasury.transfer_ownership(&B, &B).unwrap_err();
    assert_eq!(err.to_string(), "Ownable: caller is not the owner");
    assert_eq!(treasury.owner(), A);
}

#[test]
fn renounce_owner_successfully() {
    let (_, treasury) = funded(10);
    assert_ne!(treasury.owner(), Address::ZERO);
    treasury.renounce_ownership(&A).unwrap();
    assert_eq!(treasury.owner(), Address::ZERO);

    assert_eq!(treasury.transfer(&A, &B, 1), Err(TreasuryError::NotOwner));
    assert_eq!(treasury.transfer_ownership(&A, &A), Err(TreasuryError::NotOwner));
    assert_eq!(treasury.renounce_ownership(&A), Err(TreasuryError::NotOwner));
    assert_eq!(treasury.balance(), 10);
}

#[test]
fn renounce_owner_unsuccessfully() {
    let (_, treasury) = deploy(1);
    let err = treasury.renounce_ownership(&B).unwrap_err();
    assert_eq!(err.to_string(), "Ownable: caller is not the owner");
    assert_eq!(treasury.owner(), A);
}

#[test]
fn view_balance() {
    let (ledger, treasury) = deploy(1_000 * ONE_TOKEN);
    assert_eq!(treasury.balance(), 0);
    ledger
        .transfer(&HOLDER, &treasury.address(), 100 * ONE_TOKEN)
        .unwrap();
    assert_eq!(treasury.balance(), 100 * ONE_TOKEN);
}

#[test]
fn at_most_one_owner_at_a_time() {
    let (_, treasury) = funded(50);
    let callers = [A, B, C, HOLDER];
    let owners = |t: &Treasury| {
        callers
            .iter()
            .filter(|c| t.transfer(c, &HOLDER, 0).is_ok())
            .count()
    };
    assert_eq!(owners(&treasury), 1);
    treasury.transfer_ownership(&A, &C).unwrap();
    assert_eq!(owners(&treasury), 1);
    treasury.renounce_ownership(&C).unwrap();
    assert_eq!(owners(&treasury), 0);
}

#[test]
fn concurrent_transfers_conserve_supply() {
    let supply = 1_000 * ONE_TOKEN;
    let (ledger, treasury) = funded(400 * ONE_TOKEN);
    let treasury = Arc::new(treasury);

    let payer = {
        let treasury = treasury.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                let _ = treasury.transfer(&A, &B, ONE_TOKEN);
            }
        })
    };
    let refunder = {
        let ledger = ledger.clone();
        let target = treasury.address();
        thread::spawn(move || {
            for _ in 0..200 {
                let _ = ledger.transfer(&B, &target, ONE_TOKEN);
            }
        })
    };
    let reader = {
        let ledger = ledger.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                let snapshot = ledger.snapshot();
                let sum: Amount = snapshot.balances.values().sum();
                assert_eq!(sum, supply);
            }
        })
    };

    payer.join().unwrap();
    refunder.join().unwrap();
    reader.join().unwrap();

    ledger.check_conservation().unwrap();
    assert_eq!(
        treasury.balance() + ledger.balance_of(&B),
        400 * ONE_TOKEN
    );
    assert_eq!(ledger.balance_of(&HOLDER), 600 * ONE_TOKEN);
}
