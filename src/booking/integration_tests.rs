//! Integration Tests for booking + reconciliation
//!
//! Drive the coordinator and reconciler end to end over the in-memory
//! store, a fixed clock and the real signing gateway.

#[cfg(test)]
mod integration_tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tokio::sync::mpsc::UnboundedReceiver;

    use crate::booking::coordinator::BookingCoordinator;
    use crate::booking::error::{BookingError, ValidationReason};
    use crate::booking::reconciler::{PaymentReconciler, ReconcileOutcome, RejectReason};
    use crate::booking::types::{
        BookingOutcome, BookingReceipt, BookingStatus, CreateBookingRequest, InvoiceStatus,
        Occupants, PaymentMethod, RoomId, ServiceId, ServiceSelection, UserId,
    };
    use crate::clock::FixedClock;
    use crate::config::PaymentConfig;
    use crate::money::Money;
    use crate::notification::{ChannelNotificationQueue, Notification};
    use crate::payment::callback::{self, CallbackVerification, GatewayCallback};
    use crate::payment::signing::{self, SECURE_HASH_FIELD};
    use crate::payment::{PaymentError, PaymentGateway, RedirectRequest, VnpayGateway};
    use crate::store::memory::RowCounts;
    use crate::store::{BookingStore, InMemoryBookingStore};

    const SECRET: &str = "INTEGRATIONSECRET";
    const TMN_CODE: &str = "TMN00001";

    fn payment_config() -> PaymentConfig {
        PaymentConfig {
            tmn_code: TMN_CODE.into(),
            hash_secret: SECRET.into(),
            pay_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".into(),
            return_url: "http://localhost:3000/bookings/vnpay_return".into(),
            version: "2.1.0".into(),
            command: "pay".into(),
            currency: "VND".into(),
            order_type: "other".into(),
            utc_offset_hours: 7,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }

    /// Verifies like the real gateway but can never build a redirect
    struct UnreachableGateway {
        inner: VnpayGateway,
    }

    #[async_trait]
    impl PaymentGateway for UnreachableGateway {
        async fn build_redirect_url(&self, _req: &RedirectRequest) -> Result<String, PaymentError> {
            Err(PaymentError::Unavailable("connection refused".into()))
        }

        fn verify_callback(&self, cb: &GatewayCallback) -> CallbackVerification {
            self.inner.verify_callback(cb)
        }
    }

    /// Helper wiring coordinator + reconciler over one in-memory store
    struct TestHarness {
        store: InMemoryBookingStore,
        clock: Arc<FixedClock>,
        coordinator: Arc<BookingCoordinator>,
        reconciler: Arc<PaymentReconciler>,
        notifications: UnboundedReceiver<Notification>,
    }

    impl TestHarness {
        async fn new() -> Self {
            let gateway = VnpayGateway::new(payment_config()).unwrap();
            Self::with_gateway(Arc::new(gateway)).await
        }

        async fn with_gateway(gateway: Arc<dyn PaymentGateway>) -> Self {
            let store = InMemoryBookingStore::new();
            store.add_room(1, 1000).await;
            store.add_room(2, 1500).await;
            store.add_room(3, 800).await;
            store.add_service(1, 200).await;
            store.add_service(2, 50).await;

            let clock = Arc::new(FixedClock::new(now()));
            let (queue, notifications) = ChannelNotificationQueue::unbounded();
            let shared: Arc<dyn BookingStore> = Arc::new(store.clone());

            let coordinator = Arc::new(BookingCoordinator::new(
                shared.clone(),
                gateway.clone(),
                clock.clone(),
            ));
            let reconciler = Arc::new(PaymentReconciler::new(
                shared,
                gateway,
                Arc::new(queue),
                clock.clone(),
            ));

            Self {
                store,
                clock,
                coordinator,
                reconciler,
                notifications,
            }
        }

        /// Request for `rooms` over `[now + start, now + end)`
        fn request(&self, rooms: &[i64], start: Duration, end: Duration) -> CreateBookingRequest {
            CreateBookingRequest {
                room_ids: rooms.iter().copied().map(RoomId).collect(),
                start: now() + start,
                end: now() + end,
                occupants: Occupants {
                    adults: 2,
                    children: 1,
                },
                services: Vec::new(),
                payment_method: PaymentMethod::Card,
                user_id: UserId(42),
                client_ip: "::1".into(),
                locale: "vi".into(),
            }
        }

        async fn book(&self, rooms: &[i64], start: Duration, end: Duration) -> BookingReceipt {
            let outcome = self
                .coordinator
                .create_booking(self.request(rooms, start, end))
                .await
                .unwrap();
            outcome.receipt().clone()
        }

        async fn counts(&self) -> RowCounts {
            self.store.counts().await
        }

        async fn invoice_status(&self, receipt: &BookingReceipt) -> InvoiceStatus {
            self.store
                .invoice_for_booking(receipt.booking_id)
                .await
                .unwrap()
                .status
        }

        async fn booking_status(&self, receipt: &BookingReceipt) -> BookingStatus {
            self.store.booking(receipt.booking_id).await.unwrap().status
        }
    }

    fn hours(h: i64) -> Duration {
        Duration::hours(h)
    }

    fn minutes(m: i64) -> Duration {
        Duration::minutes(m)
    }

    /// Callback as the gateway would send it, signed with the shared secret
    fn signed_callback(reference: &str, amount: Money, response_code: &str) -> GatewayCallback {
        let mut cb = GatewayCallback::from_pairs([
            (callback::AMOUNT, amount.to_string()),
            (callback::BANK_CODE, "NCB".to_string()),
            (callback::BANK_TRAN_NO, "VNP14226112".to_string()),
            (callback::CARD_TYPE, "ATM".to_string()),
            (
                callback::ORDER_INFO,
                format!("Payment-for-invoice-{}", reference),
            ),
            (callback::PAY_DATE, "20300101071500".to_string()),
            (callback::RESPONSE_CODE, response_code.to_string()),
            (callback::TMN_CODE, TMN_CODE.to_string()),
            (callback::TRANSACTION_NO, "14226112".to_string()),
            (callback::TXN_REF, reference.to_string()),
            (callback::TRANSACTION_STATUS, response_code.to_string()),
        ]);
        let hash = signing::sign(SECRET.as_bytes(), &signing::canonical_query(cb.params())).unwrap();
        cb.set(SECURE_HASH_FIELD, hash);
        cb
    }

    fn callback_for(receipt: &BookingReceipt, response_code: &str) -> GatewayCallback {
        signed_callback(&receipt.invoice_code, receipt.total_amount, response_code)
    }

    // ========================================================================
    // Booking creation
    // ========================================================================

    #[tokio::test]
    async fn test_booking_commits_every_row() {
        let h = TestHarness::new().await;
        let mut req = h.request(&[1, 2], hours(2), hours(26));
        req.services = vec![
            ServiceSelection::new(ServiceId(1), 2),
            ServiceSelection::new(ServiceId(2), 3),
        ];

        let outcome = h.coordinator.create_booking(req).await.unwrap();
        let receipt = outcome.receipt().clone();

        assert_eq!(
            h.counts().await,
            RowCounts {
                bookings: 1,
                invoices: 1,
                booking_rooms: 2,
                booking_services: 2,
            }
        );
        // 1000 + 1500 for one night, 200×2 + 50×3
        assert_eq!(receipt.total_amount, Money::from_minor(3050));
        assert_eq!(h.invoice_status(&receipt).await, InvoiceStatus::Pending);
        assert_eq!(h.booking_status(&receipt).await, BookingStatus::Booked);
        assert_eq!(
            receipt.invoice_code,
            format!("INV-{}-{}", now().timestamp_millis(), receipt.booking_id)
        );

        let url = outcome.payment_url().unwrap();
        assert!(url.contains(&format!("vnp_TxnRef={}", receipt.invoice_code)));
        assert!(url.contains("vnp_Amount=3050"));
        assert!(url.contains("vnp_IpAddr=127.0.0.1"));
        assert!(url.contains("vnp_SecureHash="));
    }

    #[tokio::test]
    async fn test_concrete_scenario_total_1400() {
        let h = TestHarness::new().await;
        let mut req = h.request(&[1], hours(1), hours(25));
        req.services = vec![ServiceSelection::new(ServiceId(1), 2)];

        let receipt = h.coordinator.create_booking(req).await.unwrap().receipt().clone();
        assert_eq!(receipt.total_amount, Money::from_minor(1400));

        let rooms = h.store.rooms_of(receipt.booking_id).await;
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].price_at_booking, Money::from_minor(1000));
        let services = h.store.services_of(receipt.booking_id).await;
        assert_eq!(services[0].quantity, 2);
        assert_eq!(services[0].price_at_booking, Money::from_minor(200));
    }

    #[tokio::test]
    async fn test_partial_day_bills_a_full_night() {
        let h = TestHarness::new().await;
        let receipt = h.book(&[1], hours(1), hours(26)).await;
        // 25 hours is two nights
        assert_eq!(receipt.total_amount, Money::from_minor(2000));
    }

    #[tokio::test]
    async fn test_price_snapshot_survives_catalog_change() {
        let h = TestHarness::new().await;
        let receipt = h.book(&[1], hours(1), hours(25)).await;

        h.store.add_room(1, 5000).await;

        let rooms = h.store.rooms_of(receipt.booking_id).await;
        assert_eq!(rooms[0].price_at_booking, Money::from_minor(1000));
        let invoice = h.store.invoice_for_booking(receipt.booking_id).await.unwrap();
        assert_eq!(invoice.total_amount, Money::from_minor(1000));
    }

    #[tokio::test]
    async fn test_overlap_conflicts_and_persists_nothing() {
        let h = TestHarness::new().await;
        h.book(&[1], hours(10), hours(11)).await;
        let before = h.counts().await;

        let err = h
            .coordinator
            .create_booking(h.request(&[1], hours(10) + minutes(30), hours(11) + minutes(30)))
            .await
            .unwrap_err();

        assert!(matches!(err, BookingError::RoomUnavailable(RoomId(1))));
        assert!(err.is_conflict());
        assert_eq!(h.counts().await, before);
    }

    #[tokio::test]
    async fn test_touching_boundary_is_not_a_conflict() {
        let h = TestHarness::new().await;
        h.book(&[1], hours(10), hours(11)).await;

        let after = h
            .coordinator
            .create_booking(h.request(&[1], hours(11), hours(12)))
            .await;
        assert!(after.is_ok());

        let before = h
            .coordinator
            .create_booking(h.request(&[1], hours(9), hours(10)))
            .await;
        assert!(before.is_ok());
        assert_eq!(h.counts().await.bookings, 3);
    }

    #[tokio::test]
    async fn test_multi_room_conflict_allocates_nothing() {
        let h = TestHarness::new().await;
        h.book(&[1], hours(10), hours(20)).await;

        let err = h
            .coordinator
            .create_booking(h.request(&[2, 1], hours(12), hours(14)))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::RoomUnavailable(RoomId(1))));

        // Room 2 was not partially taken
        let counts = h.counts().await;
        assert_eq!(counts.bookings, 1);
        assert_eq!(counts.booking_rooms, 1);
        assert!(
            h.coordinator
                .create_booking(h.request(&[2], hours(12), hours(14)))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_canceled_booking_frees_the_room() {
        let h = TestHarness::new().await;
        let receipt = h.book(&[1], hours(10), hours(20)).await;

        let declined = h.reconciler.reconcile(&callback_for(&receipt, "24")).await.unwrap();
        assert!(matches!(declined, ReconcileOutcome::Declined { .. }));

        assert!(
            h.coordinator
                .create_booking(h.request(&[1], hours(10), hours(20)))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_unknown_catalog_ids_are_not_found() {
        let h = TestHarness::new().await;

        let err = h
            .coordinator
            .create_booking(h.request(&[1, 99], hours(1), hours(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::RoomNotFound(ref ids) if ids == &vec![RoomId(99)]));
        assert!(err.is_not_found());
        assert!(!err.is_conflict());

        let mut req = h.request(&[1], hours(1), hours(2));
        req.services = vec![ServiceSelection::new(ServiceId(77), 1)];
        let err = h.coordinator.create_booking(req).await.unwrap_err();
        assert!(matches!(err, BookingError::ServiceNotFound(ref ids) if ids == &vec![ServiceId(77)]));

        assert_eq!(h.counts().await, RowCounts::default());
    }

    #[tokio::test]
    async fn test_validation_rejects_before_storage() {
        let h = TestHarness::new().await;

        let err = h
            .coordinator
            .create_booking(h.request(&[1], hours(0), hours(2)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BookingError::Validation(ValidationReason::StartTimePast)
        ));

        let err = h
            .coordinator
            .create_booking(h.request(&[], hours(1), hours(2)))
            .await
            .unwrap_err();
        assert_eq!(err.reason_code(), "ROOM_REQUIRED");

        let mut crowd = h.request(&[1], hours(1), hours(2));
        crowd.occupants.adults = u32::MAX;
        let err = h.coordinator.create_booking(crowd).await.unwrap_err();
        assert!(matches!(
            err,
            BookingError::Validation(ValidationReason::InvalidOccupancy)
        ));
        assert!(!err.is_internal());

        assert_eq!(h.counts().await, RowCounts::default());
    }

    #[tokio::test]
    async fn test_mid_transaction_failure_leaves_no_rows() {
        let h = TestHarness::new().await;
        h.store.fail_next_service_insert();

        let mut req = h.request(&[1, 2], hours(1), hours(5));
        req.services = vec![ServiceSelection::new(ServiceId(1), 1)];
        let err = h.coordinator.create_booking(req.clone()).await.unwrap_err();

        assert!(matches!(err, BookingError::Transaction(_)));
        assert!(err.is_internal());
        assert_eq!(h.counts().await, RowCounts::default());

        // The whole operation can simply be retried
        assert!(h.coordinator.create_booking(req).await.is_ok());
        assert_eq!(h.counts().await.booking_services, 1);
    }

    #[tokio::test]
    async fn test_commit_failure_leaves_no_rows() {
        let h = TestHarness::new().await;
        h.store.fail_next_commit();

        let err = h
            .coordinator
            .create_booking(h.request(&[1], hours(1), hours(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Transaction(_)));
        assert_eq!(h.counts().await, RowCounts::default());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_for_same_room_single_winner() {
        let h = TestHarness::new().await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coordinator = h.coordinator.clone();
            let req = h.request(&[3], hours(5), hours(8));
            handles.push(tokio::spawn(async move { coordinator.create_booking(req).await }));
        }

        let mut won = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => won += 1,
                Err(BookingError::RoomUnavailable(RoomId(3))) => conflicts += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(won, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(h.counts().await.bookings, 1);
    }

    // ========================================================================
    // Payment link
    // ========================================================================

    #[tokio::test]
    async fn test_payment_link_failure_keeps_booking() {
        let gateway = UnreachableGateway {
            inner: VnpayGateway::new(payment_config()).unwrap(),
        };
        let h = TestHarness::with_gateway(Arc::new(gateway)).await;

        let outcome = h
            .coordinator
            .create_booking(h.request(&[1], hours(1), hours(25)))
            .await
            .unwrap();

        let BookingOutcome::PaymentLinkFailed { receipt, error } = outcome else {
            panic!("expected PaymentLinkFailed");
        };
        assert!(error.contains("connection refused"));
        assert_eq!(h.counts().await.bookings, 1);
        assert_eq!(h.invoice_status(&receipt).await, InvoiceStatus::Pending);

        // A working gateway regenerates the link for the same invoice
        let retry = BookingCoordinator::new(
            Arc::new(h.store.clone()),
            Arc::new(VnpayGateway::new(payment_config()).unwrap()),
            h.clock.clone(),
        );
        let url = retry
            .retry_payment_url(&receipt.invoice_code, "10.0.0.1", "en")
            .await
            .unwrap();
        assert!(url.contains(&format!("vnp_TxnRef={}", receipt.invoice_code)));
        assert!(url.contains("vnp_Locale=en"));
        assert_eq!(h.counts().await.bookings, 1);
    }

    #[tokio::test]
    async fn test_retry_requires_pending_invoice() {
        let h = TestHarness::new().await;
        let receipt = h.book(&[1], hours(1), hours(25)).await;
        h.reconciler.reconcile(&callback_for(&receipt, "00")).await.unwrap();

        let err = h
            .coordinator
            .retry_payment_url(&receipt.invoice_code, "127.0.0.1", "vi")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvoiceNotPending(_)));

        let err = h
            .coordinator
            .retry_payment_url("INV-0-0", "127.0.0.1", "vi")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvoiceNotFound(_)));
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    #[tokio::test]
    async fn test_success_code_marks_paid() {
        let mut h = TestHarness::new().await;
        let receipt = h.book(&[1], hours(1), hours(25)).await;
        let paid_at = now() + minutes(15);
        h.clock.set(paid_at);

        let outcome = h.reconciler.reconcile(&callback_for(&receipt, "00")).await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Paid {
                invoice_code: receipt.invoice_code.clone(),
                booking_id: receipt.booking_id,
                replayed: false,
            }
        );

        let invoice = h.store.invoice_for_booking(receipt.booking_id).await.unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(invoice.paid_date, Some(paid_at));
        assert_eq!(h.booking_status(&receipt).await, BookingStatus::Booked);

        let confirmation = h.notifications.try_recv().unwrap();
        assert_eq!(confirmation.recipient, UserId(42));
        assert_eq!(confirmation.data["invoiceCode"], receipt.invoice_code.as_str());
    }

    #[tokio::test]
    async fn test_decline_code_cancels_both() {
        let mut h = TestHarness::new().await;
        let receipt = h.book(&[1], hours(1), hours(25)).await;

        let outcome = h.reconciler.reconcile(&callback_for(&receipt, "24")).await.unwrap();
        assert!(matches!(
            outcome,
            ReconcileOutcome::Declined { ref response_code, replayed: false, .. } if response_code == "24"
        ));

        let invoice = h.store.invoice_for_booking(receipt.booking_id).await.unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Canceled);
        assert_eq!(invoice.paid_date, None);
        assert_eq!(h.booking_status(&receipt).await, BookingStatus::Canceled);
        assert!(h.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_tampered_callback_writes_nothing() {
        let h = TestHarness::new().await;
        let receipt = h.book(&[1], hours(1), hours(25)).await;

        let original = callback_for(&receipt, "00");
        for key in original.params().keys().filter(|k| k.as_str() != SECURE_HASH_FIELD) {
            let mut tampered = original.clone();
            let value = format!("{}9", tampered.get(key).unwrap());
            tampered.set(key.clone(), value);

            let outcome = h.reconciler.reconcile(&tampered).await.unwrap();
            assert!(
                matches!(
                    outcome,
                    ReconcileOutcome::Rejected {
                        reason: RejectReason::InvalidSignature,
                        ..
                    }
                ),
                "tampered {} was accepted",
                key
            );
        }

        assert_eq!(h.invoice_status(&receipt).await, InvoiceStatus::Pending);
        assert_eq!(h.booking_status(&receipt).await, BookingStatus::Booked);
        assert_eq!(h.store.settled_transitions().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_reference_is_rejected() {
        let h = TestHarness::new().await;
        h.book(&[1], hours(1), hours(25)).await;

        let cb = signed_callback("INV-1-999", Money::from_minor(1000), "00");
        let outcome = h.reconciler.reconcile(&cb).await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Rejected {
                reason: RejectReason::UnknownReference,
                reference: Some("INV-1-999".into()),
                response_code: Some("00".into()),
            }
        );
        assert_eq!(h.store.settled_transitions().await, 0);
    }

    #[tokio::test]
    async fn test_amount_mismatch_is_rejected() {
        let h = TestHarness::new().await;
        let receipt = h.book(&[1], hours(1), hours(25)).await;

        let cb = signed_callback(&receipt.invoice_code, Money::from_minor(1), "00");
        let outcome = h.reconciler.reconcile(&cb).await.unwrap();
        assert!(matches!(
            outcome,
            ReconcileOutcome::Rejected {
                reason: RejectReason::AmountMismatch,
                ..
            }
        ));
        assert_eq!(h.invoice_status(&receipt).await, InvoiceStatus::Pending);
    }

    #[tokio::test]
    async fn test_replayed_callback_is_idempotent() {
        let mut h = TestHarness::new().await;
        let receipt = h.book(&[1], hours(1), hours(25)).await;
        let cb = callback_for(&receipt, "00");

        let first = h.reconciler.reconcile(&cb).await.unwrap();
        let paid_date = h
            .store
            .invoice_for_booking(receipt.booking_id)
            .await
            .unwrap()
            .paid_date;

        h.clock.set(now() + hours(3));
        let second = h.reconciler.reconcile(&cb).await.unwrap();

        assert!(!first.replayed());
        assert!(second.replayed());
        assert!(matches!(second, ReconcileOutcome::Paid { .. }));
        assert_eq!(h.store.settled_transitions().await, 1);

        // paid_date is not rewritten and only one confirmation goes out
        let invoice = h.store.invoice_for_booking(receipt.booking_id).await.unwrap();
        assert_eq!(invoice.paid_date, paid_date);
        assert!(h.notifications.try_recv().is_ok());
        assert!(h.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_first_writer_wins_after_decline() {
        let h = TestHarness::new().await;
        let receipt = h.book(&[1], hours(1), hours(25)).await;

        h.reconciler.reconcile(&callback_for(&receipt, "24")).await.unwrap();
        let late_success = h.reconciler.reconcile(&callback_for(&receipt, "00")).await.unwrap();

        let ReconcileOutcome::Declined {
            replayed: true,
            ref response_code,
            ..
        } = late_success
        else {
            panic!("expected a replayed decline, got {:?}", late_success);
        };
        // The committed code, not the late callback's
        assert_eq!(response_code, "24");
        assert_eq!(h.invoice_status(&receipt).await, InvoiceStatus::Canceled);
        assert_eq!(h.booking_status(&receipt).await, BookingStatus::Canceled);

        let again = h.reconciler.reconcile(&callback_for(&receipt, "11")).await.unwrap();
        assert_eq!(again, late_success);

        let json = serde_json::to_value(crate::response::ApiResponse::from(&late_success)).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["data"]["responseCode"], "24");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callbacks_settle_once() {
        let h = TestHarness::new().await;
        let receipt = h.book(&[1], hours(1), hours(25)).await;
        let cb = callback_for(&receipt, "00");

        let mut handles = Vec::new();
        for _ in 0..6 {
            let reconciler = h.reconciler.clone();
            let cb = cb.clone();
            handles.push(tokio::spawn(async move { reconciler.reconcile(&cb).await }));
        }

        let mut fresh = 0;
        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            assert!(matches!(outcome, ReconcileOutcome::Paid { .. }));
            if !outcome.replayed() {
                fresh += 1;
            }
        }

        assert_eq!(fresh, 1);
        assert_eq!(h.store.settled_transitions().await, 1);
    }
}
