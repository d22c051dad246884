//! End-to-end disbursement flow tests against a real database

#[cfg(test)]
mod tests {
    use sqlx::PgPool;
    use uuid::Uuid;
    use validator::Validate;

    use credlane_server::codes::{CodeError, CodeService, DeliveryMethod};
    use credlane_server::fees::{FeeError, FeeService, ListFeesQuery};
    use credlane_server::loan::{CreateLoanRequest, Loan, LoanService};
    use credlane_server::notify::Notifier;
    use credlane_server::transfer::planner::{CostAllocation, FeePolicy, NetworkType};
    use credlane_server::transfer::{
        CreateTransferRequest, PauseTransferRequest, ReissueCodesRequest, Transfer, TransferError,
        TransferService, TransferStatus,
    };

    /// Helper to create a test database pool
    async fn setup_test_db() -> PgPool {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/credlane_test".to_string());

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&database_url)
            .await
            .expect("Failed to connect to test database");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        pool
    }

    fn services(pool: &PgPool, validity_hours: i64) -> (LoanService, TransferService) {
        let codes = CodeService::new(validity_hours, Notifier::new(None));
        (
            LoanService::new(pool.clone(), codes.clone(), 6),
            TransferService::new(pool.clone(), FeePolicy::default(), codes),
        )
    }

    /// Walk a loan through review, contract and funds release, returning the
    /// loan and its pre-generated codes.
    async fn funded_loan(
        loans: &LoanService,
        user_id: Uuid,
    ) -> (Loan, Vec<credlane_server::codes::ValidationCode>) {
        let loan = loans
            .create_loan(CreateLoanRequest {
                user_id,
                loan_type: "personal".to_string(),
                amount: 50_000,
                interest_rate: 750,
                duration_months: 24,
            })
            .await
            .expect("create loan");

        loans.approve_loan(loan.id).await.expect("approve");
        loans.generate_contract(loan.id).await.expect("contract");
        let (_, codes) = loans
            .confirm_contract(loan.id, DeliveryMethod::None)
            .await
            .expect("confirm contract");
        let loan = loans.release_funds(loan.id).await.expect("release");

        (loan, codes)
    }

    fn transfer_request(user_id: Uuid, loan_id: Uuid, amount: i64) -> CreateTransferRequest {
        CreateTransferRequest {
            user_id,
            loan_id,
            external_account_id: None,
            amount,
            network: NetworkType::Sepa,
            urgent: false,
            cost_allocation: CostAllocation::Shared,
        }
    }

    async fn staged_transfer(
        loans: &LoanService,
        transfers: &TransferService,
        user_id: Uuid,
    ) -> (Transfer, Vec<credlane_server::codes::ValidationCode>) {
        let (loan, codes) = funded_loan(loans, user_id).await;
        let transfer = transfers
            .create_transfer(transfer_request(user_id, loan.id, 15_000))
            .await
            .expect("create transfer");

        // 15_000 SEPA is a 3-tranche plan consuming pre-generated loan codes
        assert_eq!(transfer.required_codes, 3);
        assert_eq!(transfer.status, TransferStatus::Pending);
        (transfer, codes)
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_full_disbursement_flow() {
        let pool = setup_test_db().await;
        let (loans, transfers) = services(&pool, 48);
        let user_id = Uuid::new_v4();

        let (transfer, codes) = staged_transfer(&loans, &transfers, user_id).await;

        // Codes clear tranches strictly in issuance order
        let t = transfers
            .submit_code(transfer.id, &codes[0].code)
            .await
            .expect("first code");
        assert_eq!(t.status, TransferStatus::InProgress);
        assert_eq!(t.codes_validated, 1);
        assert_eq!(t.progress_percent, 33);

        let t = transfers
            .submit_code(transfer.id, &codes[1].code)
            .await
            .expect("second code");
        assert_eq!(t.progress_percent, 66);

        let t = transfers
            .submit_code(transfer.id, &codes[2].code)
            .await
            .expect("third code");
        assert_eq!(t.status, TransferStatus::Completed);
        assert_eq!(t.progress_percent, 100);
        assert!(t.completed_at.is_some());

        // A completed transfer admits no further submissions
        let err = transfers
            .submit_code(transfer.id, &codes[3].code)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::InvalidStateTransition { .. }
        ));

        // The fee ledger got the planner's total
        let fee_service = FeeService::new(pool.clone());
        let fees = fee_service
            .list_fees(ListFeesQuery {
                user_id,
                is_paid: None,
            })
            .await
            .expect("list fees");
        assert_eq!(fees.len(), 1);
        assert_eq!(fees[0].amount, transfer.fee_amount);
        assert!(!fees[0].is_paid);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_out_of_order_code_rejected() {
        let pool = setup_test_db().await;
        let (loans, transfers) = services(&pool, 48);
        let user_id = Uuid::new_v4();

        let (transfer, codes) = staged_transfer(&loans, &transfers, user_id).await;

        let err = transfers
            .submit_code(transfer.id, &codes[1].code)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Code(CodeError::OutOfSequence)));

        // The rejection left no trace on the transfer or the skipped code
        let t = transfers
            .get_transfer(&transfer.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(t.codes_validated, 0);
        assert_eq!(t.progress_percent, 0);

        transfers
            .submit_code(transfer.id, &codes[0].code)
            .await
            .expect("correct order still works");
        transfers
            .submit_code(transfer.id, &codes[1].code)
            .await
            .expect("skipped code usable once its turn comes");
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_code_single_use() {
        let pool = setup_test_db().await;
        let (loans, transfers) = services(&pool, 48);
        let user_id = Uuid::new_v4();

        let (transfer, codes) = staged_transfer(&loans, &transfers, user_id).await;

        transfers
            .submit_code(transfer.id, &codes[0].code)
            .await
            .expect("first use");

        let err = transfers
            .submit_code(transfer.id, &codes[0].code)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::Code(CodeError::AlreadyConsumed)
        ));

        let t = transfers
            .get_transfer(&transfer.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(t.codes_validated, 1);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_expired_code_rejected_without_progress() {
        let pool = setup_test_db().await;
        // Negative validity issues codes that are already expired
        let (loans, transfers) = services(&pool, -1);
        let user_id = Uuid::new_v4();

        let (transfer, codes) = staged_transfer(&loans, &transfers, user_id).await;

        let err = transfers
            .submit_code(transfer.id, &codes[0].code)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Code(CodeError::Expired)));

        let t = transfers
            .get_transfer(&transfer.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(t.codes_validated, 0);
        assert_eq!(t.status, TransferStatus::Pending);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_pause_and_resume() {
        let pool = setup_test_db().await;
        let (loans, transfers) = services(&pool, 48);
        let user_id = Uuid::new_v4();

        let (transfer, codes) = staged_transfer(&loans, &transfers, user_id).await;

        transfers
            .submit_code(transfer.id, &codes[0].code)
            .await
            .expect("advance to 33%");

        let (paused, resume_code) = transfers
            .pause(
                transfer.id,
                PauseTransferRequest {
                    delivery_method: DeliveryMethod::None,
                },
            )
            .await
            .expect("pause");
        assert!(paused.is_paused);
        assert_eq!(paused.pause_percent, Some(33));
        assert_eq!(paused.pause_codes_validated, Some(1));

        // While paused, the next initial code is refused
        let err = transfers
            .submit_code(transfer.id, &codes[1].code)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::InvalidStateTransition { .. }
        ));

        // The resume code lifts the pause without crediting a tranche
        let resumed = transfers
            .submit_code(transfer.id, &resume_code.code)
            .await
            .expect("resume");
        assert!(!resumed.is_paused);
        assert_eq!(resumed.codes_validated, 1);
        assert_eq!(resumed.progress_percent, 33);

        // The same pause point cannot be reused
        let err = transfers
            .pause(
                transfer.id,
                PauseTransferRequest {
                    delivery_method: DeliveryMethod::None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::InvalidStateTransition { .. }
        ));

        // Advancement continues from the frozen point
        let t = transfers
            .submit_code(transfer.id, &codes[1].code)
            .await
            .expect("advance after resume");
        assert_eq!(t.codes_validated, 2);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_reissue_replaces_expired_resume_code() {
        let pool = setup_test_db().await;
        let (loans, transfers) = services(&pool, 48);
        // A second service on the same pool whose issued codes are already
        // expired, used only to pause the transfer.
        let (_, transfers_exp) = services(&pool, -1);
        let user_id = Uuid::new_v4();

        let (transfer, codes) = staged_transfer(&loans, &transfers, user_id).await;
        transfers
            .submit_code(transfer.id, &codes[0].code)
            .await
            .expect("advance to 33%");

        let (_, dead_resume) = transfers_exp
            .pause(
                transfer.id,
                PauseTransferRequest {
                    delivery_method: DeliveryMethod::None,
                },
            )
            .await
            .expect("pause with expired resume code");

        // The expired resume code reports its own problem
        let err = transfers
            .submit_code(transfer.id, &dead_resume.code)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Code(CodeError::Expired)));

        // Reissue mints a fresh resume code at the frozen checkpoint
        let (_, replacements) = transfers
            .reissue_codes(
                transfer.id,
                ReissueCodesRequest {
                    delivery_method: DeliveryMethod::None,
                },
            )
            .await
            .expect("reissue resume code");
        assert_eq!(replacements.len(), 1);
        assert_eq!(replacements[0].pause_percent, Some(33));

        // A usable resume code blocks further reissue
        let err = transfers
            .reissue_codes(
                transfer.id,
                ReissueCodesRequest {
                    delivery_method: DeliveryMethod::None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::InvalidStateTransition { .. }
        ));

        let resumed = transfers
            .submit_code(transfer.id, &replacements[0].code)
            .await
            .expect("resume with replacement");
        assert!(!resumed.is_paused);

        transfers
            .submit_code(transfer.id, &codes[1].code)
            .await
            .expect("advance after resume");
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_reissue_replaces_expired_initial_codes() {
        let pool = setup_test_db().await;
        // Every code this pair issues is born expired
        let (loans_exp, transfers_exp) = services(&pool, -1);
        let (_, transfers) = services(&pool, 48);
        let user_id = Uuid::new_v4();

        let (loan, _) = funded_loan(&loans_exp, user_id).await;
        let transfer = transfers_exp
            .create_transfer(transfer_request(user_id, loan.id, 15_000))
            .await
            .expect("create transfer");
        assert_eq!(transfer.required_codes, 3);

        // Every code issued at creation was born expired, so the transfer
        // is stalled until replacements are minted
        let (_, replacements) = transfers
            .reissue_codes(
                transfer.id,
                ReissueCodesRequest {
                    delivery_method: DeliveryMethod::None,
                },
            )
            .await
            .expect("reissue initial codes");
        assert_eq!(replacements.len(), 3);

        // Replacements carry fresh sequence slots and clear tranches in order
        for (i, code) in replacements.iter().enumerate() {
            let t = transfers
                .submit_code(transfer.id, &code.code)
                .await
                .expect("advance with replacement");
            assert_eq!(t.codes_validated, i as i32 + 1);
        }

        let t = transfers
            .get_transfer(&transfer.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(t.status, TransferStatus::Completed);

        // A completed transfer admits no reissue
        let err = transfers
            .reissue_codes(
                transfer.id,
                ReissueCodesRequest {
                    delivery_method: DeliveryMethod::None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::InvalidStateTransition { .. }
        ));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_suspend_blocks_advancement() {
        let pool = setup_test_db().await;
        let (loans, transfers) = services(&pool, 48);
        let user_id = Uuid::new_v4();

        let (transfer, codes) = staged_transfer(&loans, &transfers, user_id).await;

        let suspended = transfers.suspend(transfer.id).await.expect("suspend");
        assert_eq!(suspended.status, TransferStatus::Suspended);
        assert!(suspended.suspended_at.is_some());

        let err = transfers
            .submit_code(transfer.id, &codes[0].code)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::InvalidStateTransition { .. }
        ));

        let reinstated = transfers.reinstate(transfer.id).await.expect("reinstate");
        assert_eq!(reinstated.status, TransferStatus::InProgress);

        transfers
            .submit_code(transfer.id, &codes[0].code)
            .await
            .expect("advance after reinstate");
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_funds_gate_blocks_transfer_creation() {
        let pool = setup_test_db().await;
        let (loans, transfers) = services(&pool, 48);
        let user_id = Uuid::new_v4();

        let loan = loans
            .create_loan(CreateLoanRequest {
                user_id,
                loan_type: "personal".to_string(),
                amount: 50_000,
                interest_rate: 750,
                duration_months: 24,
            })
            .await
            .expect("create loan");
        loans.approve_loan(loan.id).await.expect("approve");
        loans.generate_contract(loan.id).await.expect("contract");
        loans
            .confirm_contract(loan.id, DeliveryMethod::None)
            .await
            .expect("confirm");

        // Funds are pending_disbursement until released
        let err = transfers
            .create_transfer(transfer_request(user_id, loan.id, 5_000))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::FundsNotAvailable));

        loans.release_funds(loan.id).await.expect("release");
        transfers
            .create_transfer(transfer_request(user_id, loan.id, 5_000))
            .await
            .expect("transfer after release");
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_other_users_loan_is_invisible() {
        let pool = setup_test_db().await;
        let (loans, transfers) = services(&pool, 48);
        let owner = Uuid::new_v4();

        let (loan, _) = funded_loan(&loans, owner).await;

        let err = transfers
            .create_transfer(transfer_request(Uuid::new_v4(), loan.id, 5_000))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::LoanNotFound));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_fee_paid_exactly_once() {
        let pool = setup_test_db().await;
        let (loans, transfers) = services(&pool, 48);
        let fee_service = FeeService::new(pool.clone());
        let user_id = Uuid::new_v4();

        let (loan, _) = funded_loan(&loans, user_id).await;
        transfers
            .create_transfer(transfer_request(user_id, loan.id, 15_000))
            .await
            .expect("create transfer");

        let fees = fee_service
            .list_fees(ListFeesQuery {
                user_id,
                is_paid: None,
            })
            .await
            .expect("list fees");
        assert_eq!(fees.len(), 1);

        let paid = fee_service.mark_paid(fees[0].id).await.expect("pay");
        assert!(paid.is_paid);
        assert!(paid.paid_at.is_some());

        let err = fee_service.mark_paid(fees[0].id).await.unwrap_err();
        assert!(matches!(err, FeeError::AlreadyPaid));
    }

    #[tokio::test]
    async fn test_transfer_request_validation() {
        let mut request = transfer_request(Uuid::new_v4(), Uuid::new_v4(), 1_000);
        assert!(request.validate().is_ok());

        request.amount = 0;
        assert!(request.validate().is_err());
    }
}
