use chrono::NaiveDate;
use tvde_fleet::approvals::{
    ApprovalAction, ApprovalError, ApprovalService, NewRequest, RequestFilter, RequestKind,
    RequestStatus,
};
use tvde_fleet::auth::{AuthUser, Role};
use tvde_fleet::commission::{PlanTier, StatementError, StatementService, StatementStatus};
use tvde_fleet::fleet::{
    Assignment, ContractKind, DocumentKind, DocumentUpload, Energy, FleetService, FleetStores,
    NewDriver, NewPartner, NewVehicle, Period, Platform,
};
use tvde_fleet::ingestion::{EarningRecord, LedgerEntry, LedgerItem, LedgerStore};
use tvde_fleet::store::new_id;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

struct Fleet {
    fleet: FleetService,
    ledger: LedgerStore,
    statements: StatementService,
    approvals: ApprovalService,
    partner_id: String,
    driver_id: String,
    vehicle_id: String,
}

fn fleet() -> Fleet {
    let fleet = FleetService::new(FleetStores::in_memory());
    let ledger = LedgerStore::default();
    let partner = fleet
        .create_partner(NewPartner {
            name: "Frota Braga".to_string(),
            nif: "501442600".to_string(),
            email: "geral@frotabraga.pt".to_string(),
            phone: None,
            plan: PlanTier::Essencial,
            approval_limit: None,
        })
        .expect("partner");
    let driver = fleet
        .register_driver(
            &partner.id,
            NewDriver {
                name: "Marta Lopes".to_string(),
                nif: "123456789".to_string(),
                email: "marta@example.pt".to_string(),
                phone: None,
                licence_number: "BR-88".to_string(),
                licence_expiry: date(2031, 6, 30),
                tvde_certificate_expiry: None,
                iban: None,
                uber_uuid: None,
                bolt_id: None,
            },
        )
        .expect("driver");
    for kind in DocumentKind::mandatory() {
        fleet
            .attach_document(
                &partner.id,
                &driver.id,
                DocumentUpload {
                    kind,
                    storage_path: None,
                    valid_until: None,
                },
            )
            .expect("document");
    }
    fleet
        .activate_driver(&partner.id, &driver.id, date(2025, 1, 6))
        .expect("active");
    let vehicle = fleet
        .register_vehicle(
            &partner.id,
            NewVehicle {
                plate: "12-AB-34".to_string(),
                make: "Kia".to_string(),
                model: "Niro".to_string(),
                year: 2021,
                energy: Energy::Eletrico,
                via_verde_obu: None,
                fuel_card: None,
                charging_card: None,
                insurance_expiry: None,
                inspection_expiry: None,
            },
        )
        .expect("vehicle");
    fleet
        .assign_vehicle(
            &partner.id,
            &vehicle.id,
            Assignment {
                driver_id: driver.id.clone(),
                kind: ContractKind::Comissao {
                    percentage: Some(25.0),
                },
                start: date(2025, 1, 6),
                deposit: 0.0,
            },
        )
        .expect("contract");

    let statements = StatementService::in_memory(fleet.clone(), ledger.clone());
    let approvals = ApprovalService::in_memory(fleet.clone(), statements.clone());
    Fleet {
        fleet,
        ledger,
        statements,
        approvals,
        partner_id: partner.id,
        driver_id: driver.id,
        vehicle_id: vehicle.id,
    }
}

impl Fleet {
    fn user(&self, id: &str, role: Role) -> AuthUser {
        AuthUser {
            user_id: id.to_string(),
            role,
            partner_id: Some(self.partner_id.clone()),
            driver_id: (role == Role::Motorista).then(|| self.driver_id.clone()),
        }
    }

    fn request(&self, requester: &AuthUser, kind: RequestKind, amount: f64) -> String {
        self.approvals
            .submit(
                &self.partner_id,
                requester,
                NewRequest {
                    kind,
                    amount,
                    description: " Pneus dianteiros ".to_string(),
                    driver_id: Some(self.driver_id.clone()),
                },
            )
            .expect("submitted")
            .id
    }

    fn earn(&self, week: Period, gross: f64, net: f64) {
        let entry = LedgerEntry {
            id: new_id(),
            partner_id: self.partner_id.clone(),
            platform: Platform::Bolt,
            period: week,
            sync_log_id: "sync".to_string(),
            driver_id: Some(self.driver_id.clone()),
            vehicle_id: Some(self.vehicle_id.clone()),
            occurred_on: week.start,
            item: LedgerItem::Earning(EarningRecord {
                platform: Platform::Bolt,
                driver_ref: None,
                driver_name: Some("Marta Lopes".to_string()),
                period: week,
                gross,
                tips: 0.0,
                platform_fee: gross - net,
                net,
                trips: 40,
            }),
        };
        self.ledger
            .replace_import(&self.partner_id, Platform::Bolt, week, vec![entry])
            .expect("ledger");
    }
}

#[test]
fn expense_moves_from_pending_to_paid_with_separate_actors() {
    let fleet = fleet();
    let gestor = fleet.user("u-gestor", Role::Gestor);
    let other_gestor = fleet.user("u-gestor-2", Role::Gestor);
    let accounting = fleet.user("u-contas", Role::Contabilidade);

    let id = fleet.request(&gestor, RequestKind::Reparacao, 180.0);

    assert!(matches!(
        fleet.approvals.approve(&fleet.partner_id, &id, &gestor, None),
        Err(ApprovalError::SelfApproval)
    ));
    assert!(matches!(
        fleet.approvals.pay(&fleet.partner_id, &id, &accounting, None),
        Err(ApprovalError::InvalidTransition {
            from: RequestStatus::Pendente,
            action: ApprovalAction::Pagar
        })
    ));

    let approved = fleet
        .approvals
        .approve(&fleet.partner_id, &id, &other_gestor, Some("ok".to_string()))
        .expect("approved");
    assert_eq!(approved.status, RequestStatus::Aprovado);

    assert!(matches!(
        fleet.approvals.pay(&fleet.partner_id, &id, &other_gestor, None),
        Err(ApprovalError::NotPermitted(_))
    ));
    let paid = fleet
        .approvals
        .pay(&fleet.partner_id, &id, &accounting, None)
        .expect("paid");
    assert_eq!(paid.status, RequestStatus::Pago);
    assert_eq!(paid.description, "Pneus dianteiros");
    let actions: Vec<ApprovalAction> = paid.history.iter().map(|event| event.action).collect();
    assert_eq!(
        actions,
        [ApprovalAction::Submeter, ApprovalAction::Aprovar, ApprovalAction::Pagar]
    );

    let error = fleet
        .approvals
        .cancel(&fleet.partner_id, &id, &gestor)
        .expect_err("paid requests are final");
    assert_eq!(error.to_string(), "cannot cancel a request that is pago");
}

#[test]
fn amounts_above_the_partner_limit_need_the_owner() {
    let fleet = fleet();
    let gestor = fleet.user("u-gestor", Role::Gestor);
    let accounting = fleet.user("u-contas", Role::Contabilidade);
    let owner = fleet.user("u-dono", Role::Parceiro);

    let id = fleet.request(&gestor, RequestKind::Adiantamento, 750.0);
    assert!(matches!(
        fleet.approvals.approve(&fleet.partner_id, &id, &accounting, None),
        Err(ApprovalError::AboveLimit { limit, .. }) if limit == 500.0
    ));
    let approved = fleet
        .approvals
        .approve(&fleet.partner_id, &id, &owner, None)
        .expect("owner approves");
    assert_eq!(approved.status, RequestStatus::Aprovado);
}

#[test]
fn rejection_requires_a_reason_and_closes_the_request() {
    let fleet = fleet();
    let gestor = fleet.user("u-gestor", Role::Gestor);
    let owner = fleet.user("u-dono", Role::Parceiro);
    let id = fleet.request(&gestor, RequestKind::Despesa, 40.0);

    assert!(matches!(
        fleet
            .approvals
            .reject(&fleet.partner_id, &id, &owner, Some("  ".to_string())),
        Err(ApprovalError::MissingReason)
    ));
    let rejected = fleet
        .approvals
        .reject(&fleet.partner_id, &id, &owner, Some("sem fatura".to_string()))
        .expect("rejected");
    assert_eq!(rejected.status, RequestStatus::Rejeitado);
    assert_eq!(
        rejected.history.last().and_then(|event| event.note.as_deref()),
        Some("sem fatura")
    );
    assert!(matches!(
        fleet.approvals.approve(&fleet.partner_id, &id, &owner, None),
        Err(ApprovalError::InvalidTransition { .. })
    ));
}

#[test]
fn invalid_requests_are_refused() {
    let fleet = fleet();
    let gestor = fleet.user("u-gestor", Role::Gestor);
    let new = |kind, amount: f64, description: &str| NewRequest {
        kind,
        amount,
        description: description.to_string(),
        driver_id: None,
    };

    let cases = [
        (new(RequestKind::Despesa, 0.0, "x"), "amount"),
        (new(RequestKind::Despesa, f64::NAN, "x"), "amount"),
        (new(RequestKind::Despesa, 10.0, " "), "description"),
        (new(RequestKind::PagamentoSemanal, 10.0, "x"), "statement"),
    ];
    for (request, expected) in cases {
        let error = fleet
            .approvals
            .submit(&fleet.partner_id, &gestor, request)
            .expect_err("refused");
        assert!(error.to_string().contains(expected), "{error}");
    }

    let stranger = AuthUser {
        user_id: "u-x".to_string(),
        role: Role::Gestor,
        partner_id: Some(fleet.partner_id.clone()),
        driver_id: None,
    };
    let unknown_driver = fleet.approvals.submit(
        &fleet.partner_id,
        &stranger,
        NewRequest {
            kind: RequestKind::Despesa,
            amount: 10.0,
            description: "Lavagem".to_string(),
            driver_id: Some("nao-existe".to_string()),
        },
    );
    assert!(matches!(unknown_driver, Err(ApprovalError::Fleet(_))));
}

#[test]
fn drivers_raise_requests_for_themselves_and_see_only_their_own() {
    let fleet = fleet();
    let driver = fleet.user("u-marta", Role::Motorista);
    let gestor = fleet.user("u-gestor", Role::Gestor);

    let own = fleet
        .approvals
        .submit(
            &fleet.partner_id,
            &driver,
            NewRequest {
                kind: RequestKind::Reembolso,
                amount: 22.5,
                description: "Portagem paga em dinheiro".to_string(),
                driver_id: Some("outro-motorista".to_string()),
            },
        )
        .expect("submitted");
    assert_eq!(own.driver_id.as_deref(), Some(fleet.driver_id.as_str()));

    let unrelated = fleet
        .approvals
        .submit(
            &fleet.partner_id,
            &gestor,
            NewRequest {
                kind: RequestKind::Despesa,
                amount: 60.0,
                description: "Material de escritório".to_string(),
                driver_id: None,
            },
        )
        .expect("submitted");

    let visible = fleet
        .approvals
        .list(&fleet.partner_id, &driver, &RequestFilter::default())
        .expect("list");
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, own.id);

    let everything = fleet
        .approvals
        .list(&fleet.partner_id, &gestor, &RequestFilter::default())
        .expect("list");
    assert_eq!(everything.len(), 2);

    assert!(matches!(
        fleet.approvals.cancel(&fleet.partner_id, &own.id, &gestor),
        Err(ApprovalError::NotPermitted(_))
    ));
    assert!(matches!(
        fleet.approvals.approve(&fleet.partner_id, &unrelated.id, &driver, None),
        Err(ApprovalError::NotPermitted(_))
    ));
    let cancelled = fleet
        .approvals
        .cancel(&fleet.partner_id, &own.id, &driver)
        .expect("cancelled");
    assert_eq!(cancelled.status, RequestStatus::Cancelado);

    let pending = fleet
        .approvals
        .list(
            &fleet.partner_id,
            &gestor,
            &RequestFilter {
                status: Some(RequestStatus::Pendente),
                driver_id: None,
            },
        )
        .expect("list");
    assert_eq!(pending.len(), 1);
}

#[test]
fn weekly_statement_payment_follows_the_request() {
    let fleet = fleet();
    let week = Period::week_of(date(2025, 3, 10));
    fleet.earn(week, 1000.0, 800.0);

    let statement = fleet
        .statements
        .generate(&fleet.partner_id, week.start)
        .expect("statement");
    let line = &statement.lines[0];
    assert_eq!(line.commission_pct, Some(25.0));
    assert_eq!(line.partner_share, 250.0);
    assert_eq!(line.balance, 550.0);
    assert_eq!(statement.totals.payable, 550.0);

    let request = fleet
        .approvals
        .submit_statement(&fleet.partner_id, &statement.id, "u-contas")
        .expect("submitted");
    assert_eq!(request.kind, RequestKind::PagamentoSemanal);
    assert_eq!(request.amount, 550.0);
    assert!(matches!(
        fleet
            .approvals
            .submit_statement(&fleet.partner_id, &statement.id, "u-contas"),
        Err(ApprovalError::StatementAlreadySubmitted(_))
    ));

    let owner = fleet.user("u-dono", Role::Parceiro);
    fleet
        .approvals
        .approve(&fleet.partner_id, &request.id, &owner, None)
        .expect("approved");
    let approved = fleet
        .statements
        .get(&fleet.partner_id, &statement.id)
        .expect("statement");
    assert_eq!(approved.status, StatementStatus::Aprovado);
    assert_eq!(approved.request_id.as_deref(), Some(request.id.as_str()));

    assert!(matches!(
        fleet.statements.generate(&fleet.partner_id, week.start),
        Err(StatementError::AlreadyApproved(_))
    ));

    fleet
        .approvals
        .pay(&fleet.partner_id, &request.id, &owner, None)
        .expect("paid");
    let paid = fleet
        .statements
        .get(&fleet.partner_id, &statement.id)
        .expect("statement");
    assert_eq!(paid.status, StatementStatus::Pago);
    assert!(fleet
        .fleet
        .get_driver(&fleet.partner_id, &fleet.driver_id)
        .is_ok());
}

#[test]
fn rejected_statement_requests_can_be_raised_again() {
    let fleet = fleet();
    let week = Period::week_of(date(2025, 3, 17));
    fleet.earn(week, 400.0, 320.0);
    let statement = fleet
        .statements
        .generate(&fleet.partner_id, week.start)
        .expect("statement");

    let first = fleet
        .approvals
        .submit_statement(&fleet.partner_id, &statement.id, "u-contas")
        .expect("submitted");
    let owner = fleet.user("u-dono", Role::Parceiro);
    fleet
        .approvals
        .reject(&fleet.partner_id, &first.id, &owner, Some("valores errados".to_string()))
        .expect("rejected");

    let unlinked = fleet
        .statements
        .get(&fleet.partner_id, &statement.id)
        .expect("statement");
    assert_eq!(unlinked.status, StatementStatus::Rascunho);
    assert!(unlinked.request_id.is_none());

    let second = fleet
        .approvals
        .submit_statement(&fleet.partner_id, &statement.id, "u-contas")
        .expect("resubmitted");
    assert_ne!(first.id, second.id);
}

#[test]
fn pending_statement_payment_keeps_the_submitted_figures() {
    let fleet = fleet();
    let week = Period::week_of(date(2025, 3, 24));
    fleet.earn(week, 600.0, 480.0);
    let statement = fleet
        .statements
        .generate(&fleet.partner_id, week.start)
        .expect("statement");
    let request = fleet
        .approvals
        .submit_statement(&fleet.partner_id, &statement.id, "u-contas")
        .expect("submitted");

    fleet.earn(week, 2000.0, 1600.0);
    assert!(matches!(
        fleet.statements.generate(&fleet.partner_id, week.start),
        Err(StatementError::PaymentPending(id)) if id == statement.id
    ));

    let owner = fleet.user("u-dono", Role::Parceiro);
    let approved = fleet
        .approvals
        .approve(&fleet.partner_id, &request.id, &owner, None)
        .expect("approved");
    assert_eq!(approved.amount, statement.totals.payable);
    let current = fleet
        .statements
        .get(&fleet.partner_id, &statement.id)
        .expect("statement survives");
    assert_eq!(current.status, StatementStatus::Aprovado);
    assert_eq!(current.totals, statement.totals);
}

#[test]
fn approval_refuses_a_statement_linked_elsewhere() {
    let fleet = fleet();
    let week = Period::week_of(date(2025, 3, 31));
    fleet.earn(week, 500.0, 400.0);
    let statement = fleet
        .statements
        .generate(&fleet.partner_id, week.start)
        .expect("statement");
    let request = fleet
        .approvals
        .submit_statement(&fleet.partner_id, &statement.id, "u-contas")
        .expect("submitted");
    fleet
        .statements
        .link_request(&fleet.partner_id, &statement.id, Some("outro-pedido".to_string()))
        .expect("relinked");

    let owner = fleet.user("u-dono", Role::Parceiro);
    assert!(matches!(
        fleet.approvals.approve(&fleet.partner_id, &request.id, &owner, None),
        Err(ApprovalError::StatementDetached(_))
    ));
    let still_pending = fleet
        .approvals
        .get(&fleet.partner_id, &request.id)
        .expect("request");
    assert_eq!(still_pending.status, RequestStatus::Pendente);
    let draft = fleet
        .statements
        .get(&fleet.partner_id, &statement.id)
        .expect("statement");
    assert_eq!(draft.status, StatementStatus::Rascunho);
}
